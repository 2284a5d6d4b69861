//! Job-name predicates built from the optional `name` / `excludeName` expressions

use regex::Regex;

/// A single name predicate.
///
/// Predicates are values rather than closures so that a parsed query can be
/// compared, cloned and rendered back to its source expressions.
#[derive(Debug, Clone)]
pub enum NamePredicate {
    /// Always true
    Any,
    /// True when the expression matches anywhere in the name
    Matches(Regex),
    /// Negation of the inner predicate
    Not(Box<NamePredicate>),
    /// Conjunction of both predicates
    And(Box<NamePredicate>, Box<NamePredicate>),
}

impl NamePredicate {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePredicate::Any => true,
            NamePredicate::Matches(re) => re.is_match(name),
            NamePredicate::Not(inner) => !inner.matches(name),
            NamePredicate::And(left, right) => left.matches(name) && right.matches(name),
        }
    }

    pub fn not(self) -> Self {
        NamePredicate::Not(Box::new(self))
    }

    pub fn and(self, other: NamePredicate) -> Self {
        match (self, other) {
            (NamePredicate::Any, other) => other,
            (this, NamePredicate::Any) => this,
            (this, other) => NamePredicate::And(Box::new(this), Box::new(other)),
        }
    }
}

/// The composed include/exclude filter carried by a query
#[derive(Debug, Clone)]
pub struct NameFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
    predicate: NamePredicate,
}

impl NameFilter {
    /// Filter that admits every name
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: None,
            predicate: NamePredicate::Any,
        }
    }

    /// `include AND NOT exclude`; an absent side does not constrain
    pub fn include_and_not_exclude(include: Option<Regex>, exclude: Option<Regex>) -> Self {
        let included = include
            .clone()
            .map(NamePredicate::Matches)
            .unwrap_or(NamePredicate::Any);
        let excluded = match exclude.clone() {
            Some(re) => NamePredicate::Matches(re).not(),
            None => NamePredicate::Any,
        };
        Self {
            include,
            exclude,
            predicate: included.and(excluded),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.predicate.matches(name)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    /// Source expression of the include side, empty when absent
    pub fn include_source(&self) -> &str {
        self.include.as_ref().map(Regex::as_str).unwrap_or("")
    }

    /// Source expression of the exclude side, empty when absent
    pub fn exclude_source(&self) -> &str {
        self.exclude.as_ref().map(Regex::as_str).unwrap_or("")
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl PartialEq for NameFilter {
    fn eq(&self, other: &Self) -> bool {
        self.include_source() == other.include_source()
            && self.exclude_source() == other.exclude_source()
    }
}

impl Eq for NameFilter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(s: &str) -> Regex {
        Regex::new(s).unwrap()
    }

    #[test]
    fn test_absent_filters_admit_everything() {
        let filter = NameFilter::all();
        assert!(filter.matches("anything"));
        assert!(filter.matches(""));
        assert!(filter.is_unconstrained());
    }

    #[test]
    fn test_include_only() {
        let filter = NameFilter::include_and_not_exclude(Some(re("-e2e-")), None);
        assert!(filter.matches("pull-ci-origin-master-e2e-aws"));
        assert!(!filter.matches("pull-ci-origin-master-unit"));
    }

    #[test]
    fn test_exclude_only() {
        let filter = NameFilter::include_and_not_exclude(None, Some(re("upgrade")));
        assert!(filter.matches("e2e-aws"));
        assert!(!filter.matches("e2e-aws-upgrade"));
    }

    #[test]
    fn test_include_and_not_exclude() {
        let filter = NameFilter::include_and_not_exclude(Some(re("aws")), Some(re("upgrade")));
        assert!(filter.matches("e2e-aws"));
        assert!(!filter.matches("e2e-aws-upgrade"));
        assert!(!filter.matches("e2e-gcp"));
    }

    #[test]
    fn test_filter_is_pure() {
        let filter = NameFilter::include_and_not_exclude(Some(re("^a")), Some(re("z$")));
        for _ in 0..3 {
            assert!(filter.matches("abc"));
            assert!(!filter.matches("abz"));
        }
    }

    #[test]
    fn test_equality_uses_sources() {
        let a = NameFilter::include_and_not_exclude(Some(re("x")), None);
        let b = NameFilter::include_and_not_exclude(Some(re("x")), None);
        let c = NameFilter::include_and_not_exclude(None, Some(re("x")));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.include_source(), "x");
        assert_eq!(c.exclude_source(), "x");
    }

    #[test]
    fn test_predicate_combinators() {
        let p = NamePredicate::Any.and(NamePredicate::Matches(re("a")).not());
        assert!(p.matches("bcd"));
        assert!(!p.matches("abc"));
    }
}
