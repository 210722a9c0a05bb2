pub mod loaders;
pub mod question;

pub use loaders::{load_all_toml_files, load_toml_to_extracted_content};
pub use question::{ExtractedContent, ProblemType, ProviderDescriptor, Question, Solution};
