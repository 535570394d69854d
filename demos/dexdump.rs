use dexrewrite::jvm::textifier::Textifier;
use dexrewrite::loader::{ClassLoader, Source};
use dexrewrite::{MethodErrorPolicy, Settings};
use std::env;
use std::error::Error;
use std::path::PathBuf;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: {} <classes.dex | app.apk> [class/Name ...]", args[0]);
        return;
    }

    match dump(&args[1], &args[2..]) {
        Ok(n) => eprintln!("Dumped {} classes", n),
        Err(e) => eprintln!("Aborted due to error: {}", e),
    }
}

/* Prints every requested class (or all of them) as text, stubbing methods that cannot be rewritten */
fn dump(input: &str, wanted: &[String]) -> Result<usize, Box<dyn Error>> {
    let path = PathBuf::from(input);
    let source = match path.extension().and_then(|e| e.to_str()) {
        Some("apk") | Some("jar") | Some("zip") => Source::Archive(path),
        _ => Source::DexFile(path),
    };
    let settings = Settings { method_errors: MethodErrorPolicy::Stub, ..Settings::default() };
    let loader = ClassLoader::new(vec![source], settings);

    let names = if wanted.is_empty() { loader.class_names()? } else { wanted.to_vec() };
    for name in &names {
        let text = loader.define_class(name, Textifier::new())?;
        println!("{}", String::from_utf8_lossy(&text));
    }
    Ok(names.len())
}
