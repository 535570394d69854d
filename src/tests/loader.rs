use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::dex::dex_file::{ACC_PUBLIC, ACC_STATIC};
use crate::jvm::textifier::Textifier;
use crate::loader::{ClassLoader, LoadError, Source};
use crate::settings::Settings;
use crate::tests::fixture::{Code, DexBuilder};

/// One DEX defining `a/<name>` for every name, each with an empty static `init()V`.
fn dex_with(names: &[&str]) -> Vec<u8> {
    let mut b = DexBuilder::new();
    for name in names {
        let c = b.class(&format!("La/{};", name), ACC_PUBLIC, Some("Ljava/lang/Object;"));
        b.method_def(c, "init", "()V", ACC_STATIC, Some(Code::new(0, 0, &[0x000e])));
    }
    b.build()
}

/// A scratch file removed on drop.
struct TempFile(PathBuf);

impl TempFile {
    fn new(name: &str, bytes: &[u8]) -> TempFile {
        let path = std::env::temp_dir().join(format!("dexrewrite-{}-{}", std::process::id(), name));
        fs::write(&path, bytes).unwrap();
        TempFile(path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn apk(entry: &str, dex: &[u8]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("AndroidManifest.xml", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"<manifest/>").unwrap();
    zip.start_file(entry, SimpleFileOptions::default()).unwrap();
    zip.write_all(dex).unwrap();
    zip.finish().unwrap().into_inner()
}

#[test]
fn earlier_sources_win_and_later_ones_fill_in() {
    let loader = ClassLoader::new(
        vec![Source::Dex(dex_with(&["One"])), Source::Dex(dex_with(&["One", "Two"]))],
        Settings::default(),
    );
    assert_eq!(loader.class_names().unwrap(), vec!["a/One", "a/One", "a/Two"]);

    let two = loader.load_class("a/Two").unwrap();
    assert_eq!(two.name, "a/Two");
    assert_eq!(two.super_name.as_deref(), Some("java/lang/Object"));
    assert!(two.method("init", "()V").is_some());

    match loader.load_class("a/Three") {
        Err(LoadError::ClassNotFound(name)) => assert_eq!(name, "a/Three"),
        other => panic!("unexpected {:?}", other.map(|c| c.name)),
    }
}

#[test]
fn classes_come_out_of_an_archive() {
    let file = TempFile::new("app.apk", &apk("classes.dex", &dex_with(&["Main"])));
    let loader = ClassLoader::new(vec![Source::Archive(file.0.clone())], Settings::default());
    assert_eq!(loader.class_names().unwrap(), vec!["a/Main"]);
    assert_eq!(loader.load_class("a/Main").unwrap().name, "a/Main");
}

#[test]
fn archive_entry_name_is_configurable() {
    let file = TempFile::new("split.apk", &apk("classes2.dex", &dex_with(&["Split"])));

    let loader = ClassLoader::new(vec![Source::Archive(file.0.clone())], Settings::default());
    assert!(matches!(loader.class_names(), Err(LoadError::Archive(_))));

    let settings = Settings { archive_entry: "classes2.dex".to_string(), ..Settings::default() };
    let loader = ClassLoader::new(vec![Source::Archive(file.0.clone())], settings);
    assert_eq!(loader.class_names().unwrap(), vec!["a/Split"]);
}

#[test]
fn dex_files_are_read_from_disk() {
    let file = TempFile::new("classes.dex", &dex_with(&["OnDisk"]));
    let loader = ClassLoader::new(vec![Source::DexFile(file.0.clone())], Settings::default());
    assert!(loader.load_class("a/OnDisk").is_ok());

    let missing = ClassLoader::new(vec![Source::DexFile(file.0.with_extension("missing"))], Settings::default());
    assert!(matches!(missing.load_class("a/OnDisk"), Err(LoadError::Io(_))));
}

#[test]
fn malformed_input_is_a_dex_error() {
    let loader = ClassLoader::new(vec![Source::Dex(b"not a dex file".to_vec())], Settings::default());
    match loader.class_names() {
        Err(LoadError::Dex(e)) => assert!(!e.is_translation()),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn define_class_returns_writer_output() {
    let loader = ClassLoader::new(vec![Source::Dex(dex_with(&["Two"]))], Settings::default());
    let bytes = loader.define_class("a/Two", Textifier::new()).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("// class version 50"), "{}", text);
    assert!(text.contains("class a/Two extends java/lang/Object"), "{}", text);
    assert!(text.contains("init()V"), "{}", text);
}
