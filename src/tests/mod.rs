mod loader;
mod translate;
