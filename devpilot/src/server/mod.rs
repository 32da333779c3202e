pub mod caller;
pub mod handlers;
pub mod serve;
pub mod state;
