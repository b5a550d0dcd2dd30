use clientele::search::filter_clients;
use clientele::ClientRecord;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const FIRST_NAMES: &[&str] = &[
    "Juan", "María", "Carlos", "Ana", "Pedro", "Sofía", "Diego", "Valentina",
];
const LAST_NAMES: &[&str] = &[
    "Pérez", "López", "Ruiz", "González", "Muñoz", "Rojas", "Díaz", "Soto",
];

fn synthetic_listing(size: usize) -> Vec<ClientRecord> {
    (0..size)
        .rev()
        .map(|i| {
            let first = FIRST_NAMES[i % FIRST_NAMES.len()];
            let last = LAST_NAMES[(i / FIRST_NAMES.len()) % LAST_NAMES.len()];
            ClientRecord {
                id: i as i64 + 1,
                name: format!("{first} {last}"),
                email: format!("{}.{}{}@correo.com", first.to_lowercase(), last.to_lowercase(), i),
                phone: format!("9{:08}", i),
            }
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let listing = synthetic_listing(50_000);

    let terms = vec![
        ("blank", ""),
        ("short_name", "an"),
        ("full_name", "maría lópez"),
        ("uppercase", "GONZÁLEZ"),
        ("email_domain", "@correo.com"),
        ("phone_digits", "90001"),
        ("no_match", "zzzz"),
    ];

    let mut group = c.benchmark_group("filter");
    group.sample_size(20);

    for (name, term) in terms {
        group.bench_function(name, |b| {
            b.iter(|| filter_clients(black_box(&listing), black_box(term)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_filter);
criterion_main!(benches);
