//! Debug-info option strings.

use crate::error::OpError;

/// Parsed `getinfo` option string.
///
/// Accepted letters are a subset of `Slnfutr`; at most 7 characters, and any
/// unknown letter fails the whole call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoOptions {
    pub source: bool,
    pub line: bool,
    pub name: bool,
    pub func: bool,
    pub upvals: bool,
    pub tailcall: bool,
    pub transfer: bool,
}

impl InfoOptions {
    pub fn parse(options: &[u8]) -> Result<Self, OpError> {
        if options.len() > 7 {
            return Err(OpError::InvalidOption);
        }

        let mut r = InfoOptions::default();
        for b in options {
            match b {
                b'S' => r.source = true,
                b'l' => r.line = true,
                b'n' => r.name = true,
                b'f' => r.func = true,
                b'u' => r.upvals = true,
                b't' => r.tailcall = true,
                b'r' => r.transfer = true,
                _ => return Err(OpError::InvalidOption),
            }
        }

        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_documented_subset() {
        let o = InfoOptions::parse(b"Slnfutr").unwrap();
        assert!(o.source && o.line && o.name && o.func && o.upvals && o.tailcall && o.transfer);

        assert_eq!(InfoOptions::parse(b"").unwrap(), InfoOptions::default());
        assert!(InfoOptions::parse(b"Sl").unwrap().source);
    }

    #[test]
    fn rejects_unknown_letters_and_overlong_strings() {
        assert!(InfoOptions::parse(b"x").is_err());
        assert!(InfoOptions::parse(b"SS l").is_err());
        assert!(InfoOptions::parse(b"Slnfutrr").is_err());
    }
}
