pub mod fit;

pub use fit::FitToHost;
