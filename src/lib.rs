pub mod logging;
pub mod net;
pub mod proto;
pub mod swap;
