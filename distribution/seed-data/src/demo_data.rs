//! Demo clients for seeding a registry

pub struct DemoClient {
    pub name: &'static str,
    pub email: &'static str,
    pub phone: &'static str,
}

pub const DEMO_CLIENTS: &[DemoClient] = &[
    DemoClient {
        name: "Juan Pérez",
        email: "juan@correo.com",
        phone: "912345678",
    },
    DemoClient {
        name: "María López",
        email: "maria@correo.com",
        phone: "987654321",
    },
    DemoClient {
        name: "Carlos Ruiz",
        email: "carlos@correo.com",
        phone: "956781234",
    },
    DemoClient {
        name: "Ana González",
        email: "ana.gonzalez@correo.com",
        phone: "+56 9 4455 6677",
    },
    DemoClient {
        name: "Pedro Muñoz",
        email: "pedro.munoz@correo.com",
        phone: "56998877665",
    },
    // Landline, left unformatted
    DemoClient {
        name: "Veterinaria Los Andes",
        email: "contacto@losandes.cl",
        phone: "22345678",
    },
];
