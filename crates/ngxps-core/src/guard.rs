//! Boolean guards over the flag store

use crate::flags::FlagStore;

/// Predicate deciding whether a handler may fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Always holds
    Always,
    /// Every named flag is set (holds for an empty list)
    AllOf(Vec<String>),
    /// At least one named flag is set (never holds for an empty list)
    AnyOf(Vec<String>),
    /// No named flag is set (holds for an empty list)
    NoneOf(Vec<String>),
    /// Every inner guard holds
    And(Vec<Guard>),
}

fn names<I, S>(flags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    flags.into_iter().map(Into::into).collect()
}

impl Guard {
    pub fn all_of<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Guard::AllOf(names(flags))
    }

    pub fn any_of<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Guard::AnyOf(names(flags))
    }

    pub fn none_of<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Guard::NoneOf(names(flags))
    }

    /// Conjunction of two guards
    #[must_use]
    pub fn and(self, other: Guard) -> Self {
        match (self, other) {
            (Guard::Always, g) | (g, Guard::Always) => g,
            (Guard::And(mut left), Guard::And(right)) => {
                left.extend(right);
                Guard::And(left)
            }
            (Guard::And(mut left), g) => {
                left.push(g);
                Guard::And(left)
            }
            (g, Guard::And(mut right)) => {
                right.insert(0, g);
                Guard::And(right)
            }
            (left, right) => Guard::And(vec![left, right]),
        }
    }

    /// Evaluate against the current flags
    #[must_use]
    pub fn holds(&self, flags: &FlagStore) -> bool {
        match self {
            Guard::Always => true,
            Guard::AllOf(names) => names.iter().all(|n| flags.is_set(n)),
            Guard::AnyOf(names) => names.iter().any(|n| flags.is_set(n)),
            Guard::NoneOf(names) => !names.iter().any(|n| flags.is_set(n)),
            Guard::And(guards) => guards.iter().all(|g| g.holds(flags)),
        }
    }

    /// Flags the guard reads
    #[must_use]
    pub fn flags(&self) -> Vec<&str> {
        match self {
            Guard::Always => Vec::new(),
            Guard::AllOf(names) | Guard::AnyOf(names) | Guard::NoneOf(names) => {
                names.iter().map(String::as_str).collect()
            }
            Guard::And(guards) => guards.iter().flat_map(Guard::flags).collect(),
        }
    }
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Guard::Always => write!(f, "always"),
            Guard::AllOf(names) => write!(f, "all({})", names.join(", ")),
            Guard::AnyOf(names) => write!(f, "any({})", names.join(", ")),
            Guard::NoneOf(names) => write!(f, "none({})", names.join(", ")),
            Guard::And(guards) => {
                let parts: Vec<String> = guards.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" & "))
            }
        }
    }
}
