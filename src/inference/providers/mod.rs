pub mod lmstudio;

pub use lmstudio::LmStudioProvider;
