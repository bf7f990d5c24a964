pub mod promote;

pub use promote::promote_allocas;
