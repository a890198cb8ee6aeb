use crate::{Error, Result};
use std::fmt;

/// The verb pair used in wrong-size messages: queries "fetch"/"got" rows,
/// mutations "change"/"changed" them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fetch,
    Change,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Fetch => "fetch",
            Action::Change => "change",
        }
    }

    fn past(self) -> &'static str {
        match self {
            Action::Fetch => "got",
            Action::Change => "changed",
        }
    }
}

/// A declarative postcondition on the row/affected count of a statement.
///
/// Constructed at the call site and consumed immediately by
/// [`check_query`](Requirement::check_query) /
/// [`check_exec`](Requirement::check_exec); never persisted. `All` is
/// late-bound: the caller must resolve it to `Exactly(n)` before checking,
/// and checking it directly panics because that is a programming error, not a
/// data error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Exactly(u64),
    AtLeast(u64),
    NoMoreThan(u64),
    /// No rows at all; `Exactly(0)`.
    None,
    /// Exactly one row; `Exactly(1)`.
    One,
    /// More than one row; `AtLeast(2)`.
    Many,
    /// Late-bound: "however many there are", resolved by the caller.
    All,
}

impl Requirement {
    fn resolve(self) -> Requirement {
        match self {
            Requirement::None => Requirement::Exactly(0),
            Requirement::One => Requirement::Exactly(1),
            Requirement::Many => Requirement::AtLeast(2),
            Requirement::All => {
                panic!("Requirement::All must be resolved to Exactly(n) before checking")
            }
            other => other,
        }
    }

    fn satisfied_by(self, actual: u64) -> bool {
        match self.resolve() {
            Requirement::Exactly(n) => actual == n,
            Requirement::AtLeast(n) => actual >= n,
            Requirement::NoMoreThan(n) => actual <= n,
            _ => unreachable!(),
        }
    }

    fn check(self, actual: u64, action: Action) -> Result<()> {
        if self.satisfied_by(actual) {
            Ok(())
        } else {
            Err(Error::WrongSize(WrongSize {
                expected: self.resolve(),
                actual,
                action,
            }))
        }
    }

    /// Checks a fetched row count ("expected to fetch 2 but got 3").
    pub fn check_query(self, actual: u64) -> Result<()> {
        self.check(actual, Action::Fetch)
    }

    /// Checks a rows-affected count ("expected to change 1 but changed 0").
    pub fn check_exec(self, actual: u64) -> Result<()> {
        self.check(actual, Action::Change)
    }
}

/// A failed [`Requirement`]. Carries the actual count so callers can tell
/// not-found from not-unique through [`Error::size`] rather than message
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub struct WrongSize {
    pub expected: Requirement,
    pub actual: u64,
    pub action: Action,
}

impl WrongSize {
    pub fn size(&self) -> u64 {
        self.actual
    }

    pub fn is_not_found(&self) -> bool {
        self.actual == 0
            && match self.expected {
                Requirement::Exactly(n) | Requirement::AtLeast(n) => n > 0,
                _ => false,
            }
    }

    pub fn is_not_unique(&self) -> bool {
        self.actual > 1
            && match self.expected {
                Requirement::Exactly(n) | Requirement::NoMoreThan(n) => self.actual > n,
                _ => false,
            }
    }
}

impl fmt::Display for WrongSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = match self.expected {
            Requirement::Exactly(n) => format!("{}", n),
            Requirement::AtLeast(n) => format!("at least {}", n),
            Requirement::NoMoreThan(n) => format!("no more than {}", n),
            _ => unreachable!("WrongSize always carries a resolved requirement"),
        };
        write!(
            f,
            "expected to {} {} but {} {}",
            self.action.verb(),
            bound,
            self.action.past(),
            self.actual
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly() {
        assert!(Requirement::Exactly(2).check_query(2).is_ok());
        let err = Requirement::Exactly(2).check_query(3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected to fetch 2 but got 3"
        );
        assert_eq!(err.size(), Some(3));
    }

    #[test]
    fn exec_verbs() {
        let err = Requirement::One.check_exec(0).unwrap_err();
        assert_eq!(err.to_string(), "expected to change 1 but changed 0");
    }

    #[test]
    fn bounds() {
        assert!(Requirement::AtLeast(2).check_query(5).is_ok());
        assert!(Requirement::AtLeast(2).check_query(1).is_err());
        assert!(Requirement::NoMoreThan(2).check_query(2).is_ok());
        assert!(Requirement::NoMoreThan(2).check_query(3).is_err());
        assert!(Requirement::None.check_query(0).is_ok());
        assert!(Requirement::Many.check_query(2).is_ok());
        assert!(Requirement::Many.check_query(1).is_err());
    }

    #[test]
    fn not_found_and_not_unique_are_distinguishable() {
        let missing = Requirement::One.check_query(0).unwrap_err();
        assert!(missing.is_not_found());
        assert!(!missing.is_not_unique());

        let surplus = Requirement::One.check_query(2).unwrap_err();
        assert!(surplus.is_not_unique());
        assert!(!surplus.is_not_found());

        let at_least = Requirement::AtLeast(1).check_query(0).unwrap_err();
        assert!(at_least.is_not_found());

        // Overshooting a bound above one is still too many rows.
        let crowded = Requirement::Exactly(2).check_query(4).unwrap_err();
        assert!(crowded.is_not_unique());
        assert!(!crowded.is_not_found());
        let capped = Requirement::NoMoreThan(2).check_query(3).unwrap_err();
        assert!(capped.is_not_unique());
    }

    #[test]
    #[should_panic(expected = "must be resolved")]
    fn late_bound_all_panics() {
        let _ = Requirement::All.check_query(1);
    }
}
