//! Composable predicates that judge probe results.
//!
//! Matchers are pure and stateless. Each one can describe itself so a failed
//! poll can say what it was waiting for.
//!
//! ```rust,ignore
//! use kube_conformance::matcher::{all_of, at_least, not, equal};
//!
//! let ready = all_of(vec![Box::new(at_least(2)), Box::new(not(equal(5)))]);
//! ```

use std::fmt::Debug;

use regex::Regex;

use crate::error::{Error, Result};

/// Predicate over a probe result.
pub trait Matcher<T: ?Sized> {
    /// Whether `actual` satisfies the expectation
    fn matches(&self, actual: &T) -> bool;

    /// Expectation phrased to follow "expected <subject> to"
    fn describe(&self) -> String;
}

impl<T: ?Sized, M: Matcher<T> + ?Sized> Matcher<T> for Box<M> {
    fn matches(&self, actual: &T) -> bool {
        (**self).matches(actual)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: ?Sized, M: Matcher<T> + ?Sized> Matcher<T> for &M {
    fn matches(&self, actual: &T) -> bool {
        (**self).matches(actual)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Boxed matcher usable in `all_of` / `any_of`
pub type BoxMatcher<T> = Box<dyn Matcher<T> + Send + Sync>;

// ============================================================
// Equality
// ============================================================

#[derive(Debug, Clone)]
pub struct Equal<V> {
    expected: V,
}

/// Matches values equal to `expected`.
pub fn equal<V>(expected: V) -> Equal<V> {
    Equal { expected }
}

impl<T, V> Matcher<T> for Equal<V>
where
    T: PartialEq<V> + ?Sized,
    V: Debug,
{
    fn matches(&self, actual: &T) -> bool {
        *actual == self.expected
    }

    fn describe(&self) -> String {
        format!("equal {:?}", self.expected)
    }
}

/// Matches `true`.
pub fn be_true() -> Equal<bool> {
    equal(true)
}

/// Matches `false`.
pub fn be_false() -> Equal<bool> {
    equal(false)
}

/// Matches any value; useful when only probe success matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anything;

pub fn anything() -> Anything {
    Anything
}

impl<T: ?Sized> Matcher<T> for Anything {
    fn matches(&self, _actual: &T) -> bool {
        true
    }

    fn describe(&self) -> String {
        "succeed".to_string()
    }
}

// ============================================================
// Text
// ============================================================

#[derive(Debug, Clone)]
pub struct ContainSubstring {
    needle: String,
}

/// Matches text containing `needle`.
pub fn contain_substring(needle: impl Into<String>) -> ContainSubstring {
    ContainSubstring {
        needle: needle.into(),
    }
}

impl<T: AsRef<str> + ?Sized> Matcher<T> for ContainSubstring {
    fn matches(&self, actual: &T) -> bool {
        actual.as_ref().contains(&self.needle)
    }

    fn describe(&self) -> String {
        format!("contain substring {:?}", self.needle)
    }
}

#[derive(Debug, Clone)]
pub struct MatchRegex {
    regex: Regex,
}

/// Matches text where `pattern` finds a match.
pub fn match_regex(pattern: &str) -> Result<MatchRegex> {
    let regex = Regex::new(pattern)
        .map_err(|e| Error::Config(format!("invalid regex {:?}: {}", pattern, e)))?;
    Ok(MatchRegex { regex })
}

impl<T: AsRef<str> + ?Sized> Matcher<T> for MatchRegex {
    fn matches(&self, actual: &T) -> bool {
        self.regex.is_match(actual.as_ref())
    }

    fn describe(&self) -> String {
        format!("match regex {:?}", self.regex.as_str())
    }
}

// ============================================================
// Numeric thresholds
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordering {
    Greater,
    AtLeast,
    Less,
    AtMost,
}

#[derive(Debug, Clone)]
pub struct Compare<V> {
    bound: V,
    ordering: Ordering,
}

pub fn greater_than<V>(bound: V) -> Compare<V> {
    Compare {
        bound,
        ordering: Ordering::Greater,
    }
}

pub fn at_least<V>(bound: V) -> Compare<V> {
    Compare {
        bound,
        ordering: Ordering::AtLeast,
    }
}

pub fn less_than<V>(bound: V) -> Compare<V> {
    Compare {
        bound,
        ordering: Ordering::Less,
    }
}

pub fn at_most<V>(bound: V) -> Compare<V> {
    Compare {
        bound,
        ordering: Ordering::AtMost,
    }
}

impl<T: PartialOrd + Debug> Matcher<T> for Compare<T> {
    fn matches(&self, actual: &T) -> bool {
        match self.ordering {
            Ordering::Greater => *actual > self.bound,
            Ordering::AtLeast => *actual >= self.bound,
            Ordering::Less => *actual < self.bound,
            Ordering::AtMost => *actual <= self.bound,
        }
    }

    fn describe(&self) -> String {
        let op = match self.ordering {
            Ordering::Greater => ">",
            Ordering::AtLeast => ">=",
            Ordering::Less => "<",
            Ordering::AtMost => "<=",
        };
        format!("be {} {:?}", op, self.bound)
    }
}

// ============================================================
// Collections
// ============================================================

#[derive(Debug, Clone)]
pub struct ContainElements<E> {
    expected: Vec<E>,
}

/// Matches collections containing every element of `expected`, in any order.
pub fn contain_elements<E>(expected: impl IntoIterator<Item = E>) -> ContainElements<E> {
    ContainElements {
        expected: expected.into_iter().collect(),
    }
}

impl<E: PartialEq + Debug, C: AsRef<[E]> + ?Sized> Matcher<C> for ContainElements<E> {
    fn matches(&self, actual: &C) -> bool {
        let actual = actual.as_ref();
        self.expected.iter().all(|e| actual.contains(e))
    }

    fn describe(&self) -> String {
        format!("contain elements {:?}", self.expected)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HaveLength {
    len: usize,
}

pub fn have_length(len: usize) -> HaveLength {
    HaveLength { len }
}

impl<E> Matcher<[E]> for HaveLength {
    fn matches(&self, actual: &[E]) -> bool {
        actual.len() == self.len
    }

    fn describe(&self) -> String {
        format!("have length {}", self.len)
    }
}

impl<E> Matcher<Vec<E>> for HaveLength {
    fn matches(&self, actual: &Vec<E>) -> bool {
        actual.len() == self.len
    }

    fn describe(&self) -> String {
        format!("have length {}", self.len)
    }
}

// ============================================================
// Combinators
// ============================================================

#[derive(Debug, Clone)]
pub struct Not<M> {
    inner: M,
}

/// Inverts a matcher.
pub fn not<M>(inner: M) -> Not<M> {
    Not { inner }
}

impl<T: ?Sized, M: Matcher<T>> Matcher<T> for Not<M> {
    fn matches(&self, actual: &T) -> bool {
        !self.inner.matches(actual)
    }

    fn describe(&self) -> String {
        format!("not {}", self.inner.describe())
    }
}

pub struct AllOf<T: ?Sized> {
    matchers: Vec<BoxMatcher<T>>,
}

/// Matches when every matcher does. An empty list always matches.
pub fn all_of<T: ?Sized>(matchers: Vec<BoxMatcher<T>>) -> AllOf<T> {
    AllOf { matchers }
}

impl<T: ?Sized> Matcher<T> for AllOf<T> {
    fn matches(&self, actual: &T) -> bool {
        self.matchers.iter().all(|m| m.matches(actual))
    }

    fn describe(&self) -> String {
        join_descriptions(&self.matchers, " and ")
    }
}

pub struct AnyOf<T: ?Sized> {
    matchers: Vec<BoxMatcher<T>>,
}

/// Matches when at least one matcher does. An empty list never matches.
pub fn any_of<T: ?Sized>(matchers: Vec<BoxMatcher<T>>) -> AnyOf<T> {
    AnyOf { matchers }
}

impl<T: ?Sized> Matcher<T> for AnyOf<T> {
    fn matches(&self, actual: &T) -> bool {
        self.matchers.iter().any(|m| m.matches(actual))
    }

    fn describe(&self) -> String {
        join_descriptions(&self.matchers, " or ")
    }
}

fn join_descriptions<T: ?Sized>(matchers: &[BoxMatcher<T>], sep: &str) -> String {
    let parts: Vec<String> = matchers.iter().map(|m| m.describe()).collect();
    format!("({})", parts.join(sep))
}

/// Matcher backed by a closure
pub struct Predicate<F> {
    description: String,
    f: F,
}

/// Wrap a closure as a matcher with a description for failure messages.
pub fn predicate<F>(description: impl Into<String>, f: F) -> Predicate<F> {
    Predicate {
        description: description.into(),
        f,
    }
}

impl<T: ?Sized, F: Fn(&T) -> bool> Matcher<T> for Predicate<F> {
    fn matches(&self, actual: &T) -> bool {
        (self.f)(actual)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
