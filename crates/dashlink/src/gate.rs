//! Equality gate every state-model setter funnels through.
//!
//! Broadcast volume is bounded by the rate of true change: a setter that
//! receives the value already stored mutates nothing and notifies nobody.

/// Write `candidate` into `slot` iff it differs from the stored value.
/// Returns whether a write happened.
pub fn apply<T: PartialEq>(slot: &mut T, candidate: T) -> bool {
    if *slot == candidate {
        return false;
    }
    *slot = candidate;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_equal_values() {
        let mut slot = 42;
        assert!(!apply(&mut slot, 42));
        assert_eq!(slot, 42);
    }

    #[test]
    fn writes_new_values() {
        let mut slot = Some(1.0f64);
        assert!(apply(&mut slot, Some(2.0)));
        assert_eq!(slot, Some(2.0));
        assert!(apply(&mut slot, None));
        assert_eq!(slot, None);
    }

    #[test]
    fn works_on_collections() {
        let mut slot = vec![0i8, -1, 100];
        assert!(!apply(&mut slot, vec![0, -1, 100]));
        assert!(apply(&mut slot, vec![0, -1, 99]));
        assert_eq!(slot, vec![0, -1, 99]);
    }
}
