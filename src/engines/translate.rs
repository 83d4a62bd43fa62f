//! Opaque machine-translation engine boundary.

pub trait MtEngine: Send + Sync {
    fn translate(&self, text: &str, src: &str, dst: &str) -> anyhow::Result<String>;
}
