pub mod gen_error;
pub mod generator;

pub use gen_error::GenError;
pub use generator::Generator;
