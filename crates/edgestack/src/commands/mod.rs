pub mod deploy;
pub mod destroy;
pub mod outputs;
pub mod synth;
pub mod validate;
