pub mod fakes;
pub mod faults;
pub mod prepare_env;
