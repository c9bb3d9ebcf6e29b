//! Retry predicates over errors and results.
//!
//! Both lists are ordered. Evaluation is a linear scan: the first predicate
//! whose type tag matches the value decides, later ones are never consulted.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

type ErrorCheck = Arc<dyn Fn(&anyhow::Error) -> Option<bool> + Send + Sync>;
type ResultCheck = Arc<dyn Fn(&dyn Any) -> Option<bool> + Send + Sync>;

/// A predicate bound to one concrete error type.
#[derive(Clone)]
pub struct ErrorPredicate {
    type_name: &'static str,
    check: ErrorCheck,
}

impl ErrorPredicate {
    /// Wraps `predicate`; it only sees errors that downcast to `E`.
    pub fn new<E, F>(predicate: F) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            type_name: type_name::<E>(),
            check: Arc::new(move |err: &anyhow::Error| err.downcast_ref::<E>().map(&predicate)),
        }
    }

    /// `None` when the error is not of this predicate's type.
    pub fn evaluate(&self, err: &anyhow::Error) -> Option<bool> {
        (self.check)(err)
    }

    /// Name of the type this predicate inspects.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ErrorPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorPredicate<{}>", self.type_name)
    }
}

/// A predicate bound to one concrete result type.
#[derive(Clone)]
pub struct ResultPredicate {
    type_name: &'static str,
    check: ResultCheck,
}

impl ResultPredicate {
    /// Wraps `predicate`; it only sees results of type `R`.
    pub fn new<R, F>(predicate: F) -> Self
    where
        R: 'static,
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        Self {
            type_name: type_name::<R>(),
            check: Arc::new(move |value: &dyn Any| value.downcast_ref::<R>().map(&predicate)),
        }
    }

    /// `None` when the value is not of this predicate's type.
    pub fn evaluate(&self, value: &dyn Any) -> Option<bool> {
        (self.check)(value)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ResultPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultPredicate<{}>", self.type_name)
    }
}

/// Ordered error predicates.
#[derive(Clone, Debug, Default)]
pub struct ErrorPredicates(Vec<ErrorPredicate>);

impl ErrorPredicates {
    /// Appends after the existing predicates.
    pub fn push(&mut self, predicate: ErrorPredicate) {
        self.0.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Verdict of the first predicate whose type matches, if any.
    pub fn evaluate(&self, err: &anyhow::Error) -> Option<bool> {
        self.0.iter().find_map(|p| p.evaluate(err))
    }
}

/// Ordered result predicates.
#[derive(Clone, Debug, Default)]
pub struct ResultPredicates(Vec<ResultPredicate>);

impl ResultPredicates {
    /// Appends after the existing predicates.
    pub fn push(&mut self, predicate: ResultPredicate) {
        self.0.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Verdict of the first predicate whose type matches, if any.
    pub fn evaluate(&self, value: &dyn Any) -> Option<bool> {
        self.0.iter().find_map(|p| p.evaluate(value))
    }
}

/// Static allow-list entry: "errors of type E are retryable".
#[derive(Clone, Copy)]
pub struct ErrorMatcher {
    type_name: &'static str,
    matches: fn(&anyhow::Error) -> bool,
}

impl ErrorMatcher {
    /// Matches any error whose chain root downcasts to `E`.
    pub fn of<E>() -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        fn matches<E>(err: &anyhow::Error) -> bool
        where
            E: fmt::Display + fmt::Debug + Send + Sync + 'static,
        {
            err.downcast_ref::<E>().is_some()
        }

        Self {
            type_name: type_name::<E>(),
            matches: matches::<E>,
        }
    }

    /// Whether `err` is of the listed type.
    pub fn matches(&self, err: &anyhow::Error) -> bool {
        (self.matches)(err)
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorMatcher<{}>", self.type_name)
    }
}
