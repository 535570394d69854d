//! # dexrewrite
//!
//! Reads Android DEX files and rewrites each class's Dalvik register bytecode into the
//! call sequence of a stack-machine class visitor.
//!
//! ```no_run
//!  use dexrewrite::loader::{ClassLoader, Source};
//!  use dexrewrite::settings::Settings;
//!  use std::path::PathBuf;
//!
//!  let loader = ClassLoader::new(vec![Source::Archive(PathBuf::from("app.apk"))], Settings::default());
//!  let class = loader.load_class("com/example/MainActivity").unwrap();
//!  println!("{} has {} methods", class.name, class.methods.len());
//! ```

#[macro_use]
pub mod dex;

pub mod android;
pub mod jvm;
pub mod loader;
pub mod settings;
pub mod translate;
pub mod types;

#[cfg(test)]
mod tests;

pub use dex::error::{DexError, ErrorKind};
pub use dex::DexFile;
pub use settings::{MethodErrorPolicy, Settings};
