pub mod catch22;
pub mod descriptive;
pub mod dfa;
pub mod entropy;
pub mod spectral;
pub mod window;
