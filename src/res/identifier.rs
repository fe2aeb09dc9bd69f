use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// The stable key a resource is registered and looked up under. It is either a
/// normalized file path or the hex rendering of a content hash.
///
/// Cloning an `Identifier` is cheap, the underlying string is shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(Arc<str>);

impl Identifier {
    #[inline]
    pub fn new<T: AsRef<str>>(v: T) -> Self {
        Identifier(Arc::from(v.as_ref()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'a> From<&'a str> for Identifier {
    fn from(v: &'a str) -> Self {
        Identifier::new(v)
    }
}

impl From<String> for Identifier {
    fn from(v: String) -> Self {
        Identifier(Arc::from(v))
    }
}

impl<'a> From<&'a Identifier> for Identifier {
    fn from(v: &'a Identifier) -> Self {
        v.clone()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}
