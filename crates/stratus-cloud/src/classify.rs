//! Error classification
//!
//! Different API families signal "not found", "already exists" and
//! "try again later" in different ways: dedicated codes, HTTP statuses,
//! access-denied codes for deleted resources, or only free-form text.
//! [`ClassifierConfig`] holds the vocabulary for one or more families and
//! [`ErrorClassifier`] applies it. Both are immutable once built.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. **NotFound**: exact not-found code, forbidden-but-gone code, HTTP 404,
//!    or a not-found phrase in the message.
//! 2. **AlreadyExists**: any configured substring in code or message, or
//!    HTTP 409. Deliberately broad, so it runs after NotFound.
//! 3. **Transient**: throttling/unavailable code (global plus per-call
//!    extras), connection-reset/timeout message, HTTP 429 or 5xx, or a code
//!    matching one of the transient code patterns.
//! 4. Anything else is `Unclassified`.

use crate::error::{CloudError, ErrorKind, OperationError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::error::Error as StdError;

const DEFAULT_NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "ResourceNotFound",
    "EntityNotFound",
    "NoSuchEntity",
    "InvalidResource.NotFound",
];

const DEFAULT_FORBIDDEN_NOT_FOUND_CODES: &[&str] = &["Forbidden.NotFound", "Forbidden.ResourceNotFound"];

const DEFAULT_NOT_FOUND_PHRASES: &[&str] = &["not found", "does not exist", "no such"];

const DEFAULT_ALREADY_EXISTS_SUBSTRINGS: &[&str] =
    &["alreadyexist", "already exist", "duplicate", "conflict", "exists"];

const DEFAULT_TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequests",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "InternalError",
    "IncorrectStatus",
];

const DEFAULT_TRANSIENT_MESSAGE_PATTERNS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "timed out",
    "timeout",
    "temporarily unavailable",
];

const DEFAULT_TRANSIENT_CODE_PATTERNS: &[&str] = &[r"(?i)^throttl", r"(?i)rate_?limit"];

/// Vocabulary used by [`ErrorClassifier`]
///
/// Builder methods add to the existing lists; they never replace them.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    not_found_codes: HashSet<String>,
    forbidden_not_found_codes: HashSet<String>,
    not_found_phrases: Vec<String>,
    already_exists_substrings: Vec<String>,
    transient_codes: HashSet<String>,
    transient_message_patterns: Vec<String>,
    transient_code_patterns: Vec<Regex>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let config = Self::empty()
            .not_found_codes(DEFAULT_NOT_FOUND_CODES.iter().copied())
            .forbidden_not_found_codes(DEFAULT_FORBIDDEN_NOT_FOUND_CODES.iter().copied())
            .not_found_phrases(DEFAULT_NOT_FOUND_PHRASES.iter().copied())
            .already_exists_substrings(DEFAULT_ALREADY_EXISTS_SUBSTRINGS.iter().copied())
            .transient_codes(DEFAULT_TRANSIENT_CODES.iter().copied())
            .transient_message_patterns(DEFAULT_TRANSIENT_MESSAGE_PATTERNS.iter().copied());

        let patterns = DEFAULT_TRANSIENT_CODE_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        Self {
            transient_code_patterns: patterns,
            ..config
        }
    }
}

impl ClassifierConfig {
    /// A configuration with no rules besides the HTTP status checks
    pub fn empty() -> Self {
        Self {
            not_found_codes: HashSet::new(),
            forbidden_not_found_codes: HashSet::new(),
            not_found_phrases: Vec::new(),
            already_exists_substrings: Vec::new(),
            transient_codes: HashSet::new(),
            transient_message_patterns: Vec::new(),
            transient_code_patterns: Vec::new(),
        }
    }

    pub fn not_found_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_found_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Access-denied style codes some APIs return for resources that no
    /// longer exist
    pub fn forbidden_not_found_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_not_found_codes
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// Case-insensitive message substrings meaning "not found"
    pub fn not_found_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_lowercase(&mut self.not_found_phrases, phrases);
        self
    }

    /// Case-insensitive substrings of code or message meaning "already exists"
    pub fn already_exists_substrings<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_lowercase(&mut self.already_exists_substrings, substrings);
        self
    }

    pub fn transient_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transient_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Case-insensitive message substrings meaning "retry later"
    pub fn transient_message_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_lowercase(&mut self.transient_message_patterns, patterns);
        self
    }

    /// Add a regular expression matched against provider codes.
    ///
    /// Services differ in their throttling code prefixes, so exact codes are
    /// not always enough.
    pub fn transient_code_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            CloudError::InvalidConfig(format!("invalid transient code pattern '{}': {}", pattern, e))
        })?;
        self.transient_code_patterns.push(regex);
        Ok(self)
    }

    /// Combine two vocabularies, e.g. the defaults with a provider family.
    pub fn merge(mut self, other: &ClassifierConfig) -> Self {
        self.not_found_codes
            .extend(other.not_found_codes.iter().cloned());
        self.forbidden_not_found_codes
            .extend(other.forbidden_not_found_codes.iter().cloned());
        extend_unique(&mut self.not_found_phrases, &other.not_found_phrases);
        extend_unique(
            &mut self.already_exists_substrings,
            &other.already_exists_substrings,
        );
        self.transient_codes
            .extend(other.transient_codes.iter().cloned());
        extend_unique(
            &mut self.transient_message_patterns,
            &other.transient_message_patterns,
        );
        for pattern in &other.transient_code_patterns {
            if !self
                .transient_code_patterns
                .iter()
                .any(|p| p.as_str() == pattern.as_str())
            {
                self.transient_code_patterns.push(pattern.clone());
            }
        }
        self
    }
}

fn push_lowercase<I, S>(target: &mut Vec<String>, items: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for item in items {
        let item = item.into().to_lowercase();
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

/// Maps errors onto [`ErrorKind`]
///
/// Pure: the result depends only on the error and the configuration.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify an operation error
    pub fn classify(&self, err: &OperationError) -> ErrorKind {
        self.classify_with(err, &[])
    }

    /// Classify with additional transient codes for a single call site.
    ///
    /// The chain is searched from the innermost node outwards; the first
    /// node with an explicit kind or a matching rule decides. Foreign
    /// causes beneath an explicitly kinded node are not matched by text.
    pub fn classify_with(&self, err: &OperationError, extra_transient: &[String]) -> ErrorKind {
        self.classify_error_with(err, extra_transient)
    }

    /// Classify any error, looking through its `source()` chain for
    /// operation errors and falling back to message rules for foreign links.
    pub fn classify_error(&self, err: &(dyn StdError + 'static)) -> ErrorKind {
        self.classify_error_with(err, &[])
    }

    fn classify_error_with(
        &self,
        err: &(dyn StdError + 'static),
        extra_transient: &[String],
    ) -> ErrorKind {
        let links: Vec<&(dyn StdError + 'static)> =
            std::iter::successors(Some(err), |e| source_of(*e)).collect();

        // an exhausted wait must not be retried again by an outer loop
        let wait_outcome = links.iter().any(|link| {
            link.downcast_ref::<CloudError>()
                .is_some_and(|cloud| cloud.as_operation().is_none())
        });
        if wait_outcome {
            return ErrorKind::Fatal;
        }

        // foreign causes below an explicitly kinded node were already
        // judged at the boundary that built it
        let judged_from = links
            .iter()
            .position(|link| {
                link.downcast_ref::<OperationError>()
                    .is_some_and(|op| op.kind() != ErrorKind::Unclassified)
            })
            .unwrap_or(links.len());

        for (depth, link) in links.into_iter().enumerate().rev() {
            if let Some(op) = link.downcast_ref::<OperationError>() {
                if let Some(kind) = self.classify_node(op, extra_transient) {
                    return kind;
                }
            } else if link.is::<CloudError>() || depth > judged_from {
                // CloudError carries the same text as the node it wraps
                continue;
            } else if let Some(kind) = self.classify_message(&link.to_string()) {
                return kind;
            }
        }

        ErrorKind::Unclassified
    }

    pub fn is_not_found(&self, err: &(dyn StdError + 'static)) -> bool {
        self.classify_error(err) == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self, err: &(dyn StdError + 'static)) -> bool {
        self.classify_error(err) == ErrorKind::AlreadyExists
    }

    pub fn is_transient(&self, err: &(dyn StdError + 'static)) -> bool {
        self.classify_error(err) == ErrorKind::Transient
    }

    fn classify_node(&self, node: &OperationError, extra_transient: &[String]) -> Option<ErrorKind> {
        if node.kind() != ErrorKind::Unclassified {
            return Some(node.kind());
        }

        let code = node.provider_code();
        let status = node.http_status();
        let message = node.message().to_lowercase();

        if self.matches_not_found(code, status, &message) {
            return Some(ErrorKind::NotFound);
        }
        if self.matches_already_exists(code, status, &message) {
            return Some(ErrorKind::AlreadyExists);
        }
        if self.matches_transient(code, status, &message, extra_transient) {
            return Some(ErrorKind::Transient);
        }
        None
    }

    fn classify_message(&self, message: &str) -> Option<ErrorKind> {
        let message = message.to_lowercase();
        if self.matches_not_found(None, None, &message) {
            Some(ErrorKind::NotFound)
        } else if self.matches_already_exists(None, None, &message) {
            Some(ErrorKind::AlreadyExists)
        } else if self.matches_transient(None, None, &message, &[]) {
            Some(ErrorKind::Transient)
        } else {
            None
        }
    }

    fn matches_not_found(&self, code: Option<&str>, status: Option<u16>, message: &str) -> bool {
        let config = &self.config;
        if let Some(code) = code {
            if config.not_found_codes.contains(code)
                || config.forbidden_not_found_codes.contains(code)
            {
                return true;
            }
        }
        status == Some(404)
            || config
                .not_found_phrases
                .iter()
                .any(|phrase| message.contains(phrase.as_str()))
    }

    fn matches_already_exists(
        &self,
        code: Option<&str>,
        status: Option<u16>,
        message: &str,
    ) -> bool {
        if status == Some(409) {
            return true;
        }
        let code = code.map(str::to_lowercase);
        self.config.already_exists_substrings.iter().any(|needle| {
            message.contains(needle.as_str())
                || code.as_deref().is_some_and(|c| c.contains(needle.as_str()))
        })
    }

    fn matches_transient(
        &self,
        code: Option<&str>,
        status: Option<u16>,
        message: &str,
        extra_transient: &[String],
    ) -> bool {
        let config = &self.config;
        if let Some(code) = code {
            if config.transient_codes.contains(code)
                || extra_transient.iter().any(|extra| extra == code)
                || config.transient_code_patterns.iter().any(|p| p.is_match(code))
            {
                return true;
            }
        }
        if matches!(status, Some(429) | Some(500..=599)) {
            return true;
        }
        config
            .transient_message_patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }
}

fn source_of<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    // CloudError::Operation is transparent, so step into the node explicitly
    if let Some(CloudError::Operation(op)) = err.downcast_ref::<CloudError>() {
        return Some(op as &(dyn StdError + 'static));
    }
    err.source()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::default()
    }

    #[test]
    fn test_not_found_code_wins_over_message() {
        let c = classifier();
        for message in ["throttled, please slow down", "already exists", "connection reset", ""] {
            let err = OperationError::unclassified(message).with_code("ResourceNotFound");
            assert_eq!(c.classify(&err), ErrorKind::NotFound, "message: {message}");
        }
    }

    #[test]
    fn test_forbidden_code_means_not_found() {
        let err = OperationError::unclassified("you are not allowed")
            .with_code("Forbidden.NotFound")
            .with_status(403);
        assert_eq!(classifier().classify(&err), ErrorKind::NotFound);
    }

    #[test]
    fn test_status_404_and_phrase() {
        let c = classifier();
        let by_status = OperationError::unclassified("gone").with_status(404);
        assert_eq!(c.classify(&by_status), ErrorKind::NotFound);

        let by_phrase = OperationError::unclassified("The specified Instance Does Not Exist.");
        assert_eq!(c.classify(&by_phrase), ErrorKind::NotFound);
    }

    #[test]
    fn test_already_exists() {
        let c = classifier();
        let by_code = OperationError::unclassified("cannot create").with_code("InvalidName.AlreadyExists");
        assert_eq!(c.classify(&by_code), ErrorKind::AlreadyExists);

        let by_status = OperationError::unclassified("cannot create").with_status(409);
        assert_eq!(c.classify(&by_status), ErrorKind::AlreadyExists);

        let by_message = OperationError::unclassified("Duplicate entry for key 'name'");
        assert_eq!(c.classify(&by_message), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_5xx_is_transient() {
        let c = classifier();
        for status in [500u16, 502, 503, 504, 599] {
            let err = OperationError::unclassified("upstream error").with_status(status);
            assert_eq!(c.classify(&err), ErrorKind::Transient, "status {status}");
        }
        let throttled = OperationError::unclassified("slow down").with_status(429);
        assert_eq!(c.classify(&throttled), ErrorKind::Transient);
    }

    #[test]
    fn test_transient_codes_messages_and_patterns() {
        let c = classifier();
        let by_code = OperationError::unclassified("x").with_code("ServiceUnavailable");
        assert_eq!(c.classify(&by_code), ErrorKind::Transient);

        let by_message = OperationError::unclassified("read tcp: Connection Reset by peer");
        assert_eq!(c.classify(&by_message), ErrorKind::Transient);

        let by_pattern = OperationError::unclassified("x").with_code("Throttling.User");
        assert_eq!(c.classify(&by_pattern), ErrorKind::Transient);
    }

    #[test]
    fn test_extra_transient_codes_per_call() {
        let c = classifier();
        let err = OperationError::unclassified("disk is attaching").with_code("DiskBusy");
        assert_eq!(c.classify(&err), ErrorKind::Unclassified);
        assert_eq!(
            c.classify_with(&err, &["DiskBusy".to_string()]),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_custom_code_pattern() {
        let config = ClassifierConfig::empty()
            .transient_code_pattern(r"^Backend\.")
            .unwrap();
        let c = ErrorClassifier::new(config);
        let err = OperationError::unclassified("x").with_code("Backend.Restarting");
        assert_eq!(c.classify(&err), ErrorKind::Transient);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let result = ClassifierConfig::empty().transient_code_pattern("([unclosed");
        assert!(matches!(result, Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_unmatched_is_unclassified() {
        let err = OperationError::unclassified("invalid parameter: core").with_code("InvalidParameter");
        let kind = classifier().classify(&err);
        assert_eq!(kind, ErrorKind::Unclassified);
        assert!(!kind.is_retryable());
    }

    #[test]
    fn test_explicit_kind_is_kept() {
        let err = OperationError::fatal("bad credentials").with_status(503);
        assert_eq!(classifier().classify(&err), ErrorKind::Fatal);
    }

    #[test]
    fn test_chain_recurses_to_innermost() {
        let inner = OperationError::unclassified("nope").with_code("NotFound");
        // outer text would otherwise look like a conflict
        let wrapped = OperationError::wrap(inner, "conflict while deleting server");
        assert_eq!(classifier().classify(&wrapped), ErrorKind::NotFound);
    }

    #[test]
    fn test_explicit_kind_outranks_foreign_cause_text() {
        let c = classifier();
        let io = std::io::Error::new(std::io::ErrorKind::Other, "duplicate key");
        let err = OperationError::fatal("unreadable response").with_source(io);
        assert_eq!(c.classify(&err), ErrorKind::Fatal);

        // without a kind at the boundary the cause text still decides
        let io = std::io::Error::new(std::io::ErrorKind::Other, "duplicate key");
        let err = OperationError::unclassified("unreadable response").with_source(io);
        assert_eq!(c.classify(&err), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_inner_operation_node_still_decides_under_explicit_kind() {
        let inner = OperationError::unclassified("x").with_code("Throttling");
        let err = OperationError::fatal("giving up").with_source(inner);
        assert_eq!(classifier().classify(&err), ErrorKind::Transient);
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        let c = classifier();
        // NotFound beats AlreadyExists and Transient
        let err = OperationError::unclassified("resource already exists").with_status(404);
        assert_eq!(c.classify(&err), ErrorKind::NotFound);
        let err = OperationError::unclassified("x").with_code("NotFound").with_status(503);
        assert_eq!(c.classify(&err), ErrorKind::NotFound);

        // AlreadyExists beats Transient
        let err = OperationError::unclassified("x").with_code("Throttling").with_status(409);
        assert_eq!(c.classify(&err), ErrorKind::AlreadyExists);
        let err = OperationError::unclassified("duplicate name").with_status(503);
        assert_eq!(c.classify(&err), ErrorKind::AlreadyExists);

        let err = OperationError::unclassified("x").with_code("Throttling").with_status(500);
        assert_eq!(c.classify(&err), ErrorKind::Transient);
    }

    #[test]
    fn test_raw_errors() {
        let c = classifier();
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out");
        assert_eq!(c.classify_error(&io), ErrorKind::Transient);

        let wrapped = CloudError::from(OperationError::wrap(
            OperationError::unclassified("x").with_status(404),
            "reading record",
        ));
        assert!(c.is_not_found(&wrapped));

        let plain = std::io::Error::new(std::io::ErrorKind::Other, "permission denied");
        assert_eq!(c.classify_error(&plain), ErrorKind::Unclassified);
    }

    #[test]
    fn test_cloud_error_variant_not_retried() {
        let err = CloudError::DeadlineExceeded {
            operation: "create".to_string(),
            attempts: 3,
            elapsed: std::time::Duration::from_secs(9),
            last_error: OperationError::unclassified("x").with_code("Throttling"),
        };
        assert_eq!(classifier().classify_error(&err), ErrorKind::Fatal);
    }

    #[test]
    fn test_merge_adds_family_vocabulary() {
        let family = ClassifierConfig::empty()
            .not_found_codes(["81044"])
            .transient_codes(["971"]);
        let c = ErrorClassifier::new(ClassifierConfig::default().merge(&family));

        let gone = OperationError::unclassified("x").with_code("81044");
        assert_eq!(c.classify(&gone), ErrorKind::NotFound);
        let busy = OperationError::unclassified("x").with_code("971");
        assert_eq!(c.classify(&busy), ErrorKind::Transient);
        let generic = OperationError::unclassified("x").with_code("NotFound");
        assert_eq!(c.classify(&generic), ErrorKind::NotFound);
    }
}
