use std::fmt;

/// A token that must never show up in logs or user-visible output.
///
/// Identity tokens from the native provider and access tokens from the backend
/// are both carried as `Secret<String>`. Formatting always prints `[REDACTED]`;
/// the value is only reachable through [`expose_secret`](Self::expose_secret).
///
/// # Examples
///
/// ```
/// use shell_bridge::Secret;
///
/// let token = Secret::new("eyJhbGciOi".to_string());
/// assert_eq!(format!("{:?}", token), "[REDACTED]");
/// assert_eq!(token.expose_secret(), "eyJhbGciOi");
/// ```
// No Clone/Copy/Default: a copy has to be made on purpose through expose_secret().
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    /// Wraps a sensitive value.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Returns the wrapped value.
    ///
    /// Callers must not log or display what they get back.
    pub fn expose_secret(&self) -> &T {
        &self.inner
    }

    /// Consumes the wrapper, returning the value.
    pub fn into_exposed(self) -> T {
        self.inner
    }
}

impl Secret<String> {
    /// Returns true if the token is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.inner.trim().is_empty()
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
