//! A hierarchy of dot-separated atoms ("scopes") used to tag tokens emitted
//! by the tokenizer, e.g. `source.json`, `string.quoted.double.json`.
//!
//! Scopes are interned into a global repository and represented as two
//! `u64`s holding up to 8 atoms, 16 bits each, so that comparison and
//! `Hash`/`Eq` stay cheap regardless of how many times a given scope string
//! shows up across a grammar. Building the string back out (`Display`,
//! `Debug`, serialization) requires locking the repository and is expected to
//! be rare relative to comparisons.
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::u16;

lazy_static! {
    /// The global scope repo, exposed in case you want to minimize locking and
    /// unlocking. Shouldn't be necessary for you to use directly.
    pub static ref SCOPE_REPO: Mutex<ScopeRepository> = Mutex::new(ScopeRepository::new());
}

/// A hierarchy of atoms with semi-standardized names used to accord semantic
/// information to a specific piece of text. Generally written with the atoms
/// separated by dots, e.g. `text.plain`, `punctuation.definition.string.begin.ruby`.
#[derive(Clone, PartialEq, Eq, Copy, Default, Hash)]
pub struct Scope {
    a: u64,
    b: u64,
}

/// Not all strings are valid scopes.
#[derive(Debug, thiserror::Error)]
pub enum ParseScopeError {
    /// Due to a limitation of the internal representation, scopes can be at
    /// most 8 atoms long.
    #[error("scope has too many atoms, maximum is 8")]
    TooLong,
    /// The internal representation uses 16 bits per atom, so if all scopes
    /// ever used by the program have more than 2^16-2 distinct atoms, things
    /// break.
    #[error("too many distinct scope atoms have been interned")]
    TooManyAtoms,
}

/// Maps between scope atom strings and the numbers used to pack them into a
/// [`Scope`]. Only exposed in case you want to lock [`SCOPE_REPO`] and then
/// intern a whole batch of scopes at once without thrashing the lock. It is
/// recommended you just use [`Scope::new`].
#[derive(Debug)]
pub struct ScopeRepository {
    atoms: Vec<String>,
    atom_index_map: HashMap<String, usize>,
}

fn pack_as_u16s(atoms: &[usize]) -> Result<Scope, ParseScopeError> {
    let mut res = Scope { a: 0, b: 0 };

    for (i, &n) in atoms.iter().enumerate() {
        if n >= (u16::MAX as usize) - 2 {
            return Err(ParseScopeError::TooManyAtoms);
        }
        let small = n + 1; // +1 since we reserve 0 for unused

        if i < 4 {
            let shift = (3 - i) * 16;
            res.a |= (small << shift) as u64;
        } else {
            let shift = (7 - i) * 16;
            res.b |= (small << shift) as u64;
        }
    }
    Ok(res)
}

impl ScopeRepository {
    fn new() -> ScopeRepository {
        ScopeRepository {
            atoms: Vec::new(),
            atom_index_map: HashMap::new(),
        }
    }

    pub fn build(&mut self, s: &str) -> Result<Scope, ParseScopeError> {
        if s.is_empty() {
            return Ok(Scope { a: 0, b: 0 });
        }
        let parts: Vec<usize> = s.split('.').map(|a| self.atom_to_index(a)).collect();
        if parts.len() > 8 {
            return Err(ParseScopeError::TooLong);
        }
        pack_as_u16s(&parts[..])
    }

    pub fn to_string(&self, scope: Scope) -> String {
        let mut s = String::new();
        for i in 0..8 {
            let atom_number = scope.atom_at(i);
            if atom_number == 0 {
                break;
            }
            if i != 0 {
                s.push('.');
            }
            s.push_str(self.atom_str(atom_number));
        }
        s
    }

    fn atom_to_index(&mut self, atom: &str) -> usize {
        if let Some(index) = self.atom_index_map.get(atom) {
            return *index;
        }

        self.atoms.push(atom.to_owned());
        let index = self.atoms.len() - 1;
        self.atom_index_map.insert(atom.to_owned(), index);

        index
    }

    /// Return the string for an atom number returned by [`Scope::atom_at`].
    pub fn atom_str(&self, atom_number: u16) -> &str {
        &self.atoms[(atom_number - 1) as usize]
    }
}

impl Scope {
    /// Parses a `Scope` from a series of atoms separated by `.` characters.
    /// Example: `Scope::new("meta.rails.controller")`.
    pub fn new(s: &str) -> Result<Scope, ParseScopeError> {
        let mut repo = SCOPE_REPO.lock().unwrap();
        repo.build(s.trim())
    }

    /// Gets the atom number at a given index, 0 meaning "unused".
    pub fn atom_at(self, index: usize) -> u16 {
        let shifted = if index < 4 {
            self.a >> ((3 - index) * 16)
        } else if index < 8 {
            self.b >> ((7 - index) * 16)
        } else {
            panic!("atom index out of bounds {:?}", index);
        };
        (shifted & 0xFFFF) as u16
    }

    #[inline]
    fn missing_atoms(self) -> u32 {
        let trail = if self.b == 0 {
            self.a.trailing_zeros() + 64
        } else {
            self.b.trailing_zeros()
        };
        trail / 16
    }

    /// Return the number of atoms in the scope.
    #[inline(always)]
    pub fn len(self) -> u32 {
        8 - self.missing_atoms()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a string representation of this scope. Requires locking the
    /// global repo, so shouldn't be done in a hot loop.
    pub fn build_string(self) -> String {
        let repo = SCOPE_REPO.lock().unwrap();
        repo.to_string(self)
    }
}

impl FromStr for Scope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Scope, ParseScopeError> {
        Scope::new(s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.build_string())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{}>", self.build_string())
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.build_string())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Scope::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_works() {
        let mut repo = ScopeRepository::new();
        assert_eq!(
            repo.build("source.php").unwrap(),
            repo.build("source.php").unwrap()
        );
        assert_eq!(
            repo.build("source.php.wow.hi.bob.troll.clock.5").unwrap(),
            repo.build("source.php.wow.hi.bob.troll.clock.5").unwrap()
        );
        assert_eq!(repo.build("").unwrap(), repo.build("").unwrap());
        let s1 = repo.build("").unwrap();
        assert_eq!(repo.to_string(s1), "");
        let s2 = repo.build("source.php.wow").unwrap();
        assert_eq!(repo.to_string(s2), "source.php.wow");
        assert!(repo.build("source.php").unwrap() != repo.build("source.perl").unwrap());
        assert!(repo.build("source.php").unwrap() != repo.build("source.php.wagon").unwrap());
    }

    #[test]
    fn global_repo_works() {
        assert_eq!(
            Scope::new("source.php").unwrap(),
            Scope::new("source.php").unwrap()
        );
        assert!(Scope::from_str("1.2.3.4.5.6.7.8").is_ok());
        assert!(Scope::from_str("1.2.3.4.5.6.7.8.9").is_err());
    }

    #[test]
    fn scope_len_and_empty() {
        assert_eq!(Scope::new("").unwrap().len(), 0);
        assert!(Scope::new("").unwrap().is_empty());
        assert_eq!(Scope::new("a.b.c").unwrap().len(), 3);
        assert!(!Scope::new("a.b.c").unwrap().is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let scope = Scope::new("source.json").unwrap();
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, "\"source.json\"");
        let back: Scope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scope);
    }
}
