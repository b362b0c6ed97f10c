//! Macros for building and returning [`crate::error::IngestError`] values.

/// Creates an [`crate::error::IngestError`] from an error kind and a static description.
///
/// The description may be followed by a dynamic detail and a `source:` error. The detail is
/// either given as `detail = value`, where the value converts into a `Cow<'static, str>`, or as a
/// bare expression that is rendered with `to_string`.
///
/// ```
/// use ingest::error::ErrorKind;
/// use ingest::ingest_error;
///
/// let err = ingest_error!(ErrorKind::InvalidData, "Record is not an object", 42);
/// assert_eq!(err.detail(), Some("42"));
/// ```
#[macro_export]
macro_rules! ingest_error {
    ($kind:expr, $desc:expr $(, detail = $detail:expr)? $(, source: $source:expr)?) => {{
        let error = $crate::error::IngestError::from(($kind, $desc));
        $(let error = error.with_detail($detail);)?
        $(let error = error.with_source($source);)?
        error
    }};
    ($kind:expr, $desc:expr, $detail:expr $(, source: $source:expr)?) => {
        $crate::ingest_error!($kind, $desc, detail = $detail.to_string() $(, source: $source)?)
    };
}

/// Returns early with an [`crate::error::IngestError`] built by [`ingest_error!`].
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return ::core::result::Result::Err($crate::ingest_error!($($args)+))
    };
}
