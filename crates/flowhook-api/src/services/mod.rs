// Service layer between HTTP routes and the core collaborators

pub mod connection;

pub use connection::ConnectionService;
