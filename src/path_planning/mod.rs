// Path planning module

pub mod path_boost;

pub use path_boost::*;
