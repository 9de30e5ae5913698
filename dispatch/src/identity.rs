/// Identity of a subject, taken from its address or from a caller supplied token.
///
/// Two distinct subject instances are always distinct keys, even if they compare equal by value.
/// The subject must not move while observers are registered for it. Zero-sized values share
/// an address, so give those a token through [`SubjectId::from_raw`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubjectId(usize);

impl SubjectId {
    /// The identity of `subject`, derived from its address
    pub fn of<T: ?Sized>(subject: &T) -> Self { Self(subject as *const T as *const () as usize) }

    /// An identity token chosen by the caller
    pub const fn from_raw(token: usize) -> Self { Self(token) }

    pub fn as_raw(&self) -> usize { self.0 }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "subject:{:#x}", self.0) }
}

/// Anything other code can register interest in.
pub trait Subject {
    fn subject_id(&self) -> SubjectId { SubjectId::of(self) }
}

/// Identity of an observer: the address of its data.
///
/// An observer can compute its own id from `&self` inside `notify`, which is how
/// an observer unadvises itself mid-dispatch.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObserverId(usize);

impl ObserverId {
    pub fn of<T: ?Sized>(observer: &T) -> Self { Self(observer as *const T as *const () as usize) }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "observer:{:#x}", self.0) }
}

/// Identity of an [`ObserverList`](crate::ObserverList) allocation.
///
/// Queued signals refer to their list through a `Weak`, which reserves the
/// address until the entry is gone, so the id cannot be reused under it.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListId(pub(crate) usize);

impl std::fmt::Display for ListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "list:{:#x}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Model {
        _value: u32,
    }
    impl Subject for Model {}

    #[test]
    fn test_identity_is_by_address_not_value() {
        let a = Model { _value: 1 };
        let b = Model { _value: 1 };
        assert_ne!(a.subject_id(), b.subject_id());
        assert_eq!(a.subject_id(), SubjectId::of(&a));
    }

    #[test]
    fn test_raw_tokens() {
        assert_eq!(SubjectId::from_raw(7), SubjectId::from_raw(7));
        assert_eq!(SubjectId::from_raw(7).as_raw(), 7);
    }
}
