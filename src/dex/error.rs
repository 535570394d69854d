use std::fmt;

/// Which stage rejected the input.
///
/// `Structure` errors mean the container itself is unusable; `Translation` errors are
/// scoped to the method or class being rewritten and leave the rest of the file usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind
{
    Structure,
    Translation,
}

#[allow(unused_macros)]
macro_rules! err {
    ($base:ident, $msg:literal) => {
        DexError::with_context($base, $msg.to_string())
    };
    ($base:ident, $fmtstr:literal, $($args:tt)*) => {
        DexError::with_context($base, format!($fmtstr, $($args)*))
    };
    ($msg:literal) => {
        DexError::new($msg)
    };
    ($fmtstr:literal, $($args:tt)*) => {
        DexError::new(&format!($fmtstr, $($args)*))
    };
}

#[macro_export]
macro_rules! fail {
    ($msg:literal) => {
        return Err(DexError::new($msg))
    };
    (($msg:literal), ($context:literal)) => {
        return Err(DexError::with_context(DexError::new($msg), $context.to_string()))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err(DexError::new(&format!($fmtstr, $($args)*)))
    };
    (($fmtstr:literal, $($args:tt)*), ($contextfmt:literal, $($contextargs:tt)*)) => {
        return Err(DexError::with_context(DexError::new(&format!($fmtstr, $($args)*)), format!($contextfmt, $($contextargs)*)))
    };
}

/// Like `fail!`, but for errors raised while rewriting a method rather than while
/// reading the container.
#[macro_export]
macro_rules! untranslatable {
    ($msg:literal) => {
        return Err(DexError::translation($msg))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err(DexError::translation(&format!($fmtstr, $($args)*)))
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexError
{
    kind: ErrorKind,
    msg: String,
    contexts: Vec<String>,
}

impl DexError
{
    pub(crate) fn new(msg: &str) -> Self
    {
        DexError {
            kind: ErrorKind::Structure,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn translation(msg: &str) -> Self
    {
        DexError {
            kind: ErrorKind::Translation,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_context(base: DexError, context: String) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context);
        DexError { kind: base.kind, msg: base.msg, contexts }
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }

    pub fn is_translation(&self) -> bool
    {
        self.kind == ErrorKind::Translation
    }
}

impl fmt::Display for DexError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(ix: usize) -> Result<(), DexError>
    {
        fail!("Unexpected end of stream at offset 0x{:x}", ix);
    }

    #[test]
    fn contexts_are_chained_in_order()
    {
        let base = failing(0x70).unwrap_err();
        let e = DexError::with_context(base, "string_ids[3]".to_string());
        let e = DexError::with_context(e, "header".to_string());
        assert_eq!(e.to_string(), "Unexpected end of stream at offset 0x70 for string_ids[3] of header");
        assert_eq!(e.kind(), ErrorKind::Structure);
    }

    #[test]
    fn translation_kind_survives_context()
    {
        let e = DexError::with_context(DexError::translation("no label at 0x4"), "Lfoo/Bar;->baz()V".to_string());
        assert!(e.is_translation());
        assert_eq!(e.message(), "no label at 0x4");
    }
}
