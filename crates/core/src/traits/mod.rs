pub mod alert;
pub mod audit;
pub mod broker;
pub mod handler;

pub use alert::*;
pub use audit::*;
pub use broker::*;
pub use handler::*;
