//! Query-handler registry abstraction.
//!
//! The host exposes a line-oriented query channel to the outside world.
//! The dispatch core claims one endpoint name on it (`wproc`) so that
//! externally launched workers can register themselves. The host must
//! route `<name> <body>` requests for a claimed name to the subsystem's
//! `handle_query`, passing along ownership of the client socket.

pub trait QueryRegistry {
    /// Claim an endpoint name. Errors are errno-style codes.
    fn register_handler(&mut self, name: &str) -> Result<(), i32>;
}
