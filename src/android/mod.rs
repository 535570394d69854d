//! Android packaging: APK/JAR archives carrying a DEX member.

pub mod archive;
