pub mod init;
pub mod order;
pub mod run;

pub use init::execute_init;
pub use order::{execute_order, OrderResult};
pub use run::{execute_run, RunOptions};
