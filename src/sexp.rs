use binprot::BinProtRead;
use binprot_derive::BinProtWrite;

use crate::protocol::{invalid_data, read_string, read_tag};

/// Lists nested deeper than this are refused when reading.
const MAX_DEPTH: usize = 64;

/// S-expressions are how remote errors are described on the wire.
#[derive(BinProtWrite, Clone, PartialEq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn atom<S: Into<String>>(s: S) -> Self {
        Sexp::Atom(s.into())
    }

    fn read_nested<R: std::io::Read + ?Sized>(
        r: &mut R,
        depth: usize,
    ) -> Result<Self, binprot::Error> {
        match read_tag(r)? {
            0 => Ok(Sexp::Atom(read_string(r)?)),
            1 if depth >= MAX_DEPTH => Err(invalid_data("sexp nested too deeply")),
            1 => {
                let len = binprot::Nat0::binprot_read(r)?;
                let mut list = Vec::new();
                for _ in 0..len.0 {
                    list.push(Sexp::read_nested(r, depth + 1)?);
                }
                Ok(Sexp::List(list))
            }
            tag => Err(invalid_data(format!("unknown sexp tag {}", tag))),
        }
    }
}

impl BinProtRead for Sexp {
    fn binprot_read<R: std::io::Read + ?Sized>(r: &mut R) -> Result<Self, binprot::Error>
    where
        Self: Sized,
    {
        Sexp::read_nested(r, 0)
    }
}

// Atoms are quoted as soon as they hold something other than alphanumeric
// characters, nested quotes are escaped with the rust escaping rules.
impl std::fmt::Display for Sexp {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Sexp::Atom(atom) if atom.is_empty() => fmt.write_str("\"\""),
            Sexp::Atom(atom) if atom.chars().all(char::is_alphanumeric) => fmt.write_str(atom),
            Sexp::Atom(atom) => write!(fmt, "\"{}\"", atom.escape_default()),
            Sexp::List(list) => {
                fmt.write_str("(")?;
                for (index, sexp) in list.iter().enumerate() {
                    if index > 0 {
                        fmt.write_str(" ")?;
                    }
                    std::fmt::Display::fmt(sexp, fmt)?;
                }
                fmt.write_str(")")
            }
        }
    }
}

impl std::fmt::Debug for Sexp {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, fmt)
    }
}
