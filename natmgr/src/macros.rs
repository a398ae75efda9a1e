//! Macros for NAT manager error handling.

/// Creates a [`crate::error::NatError`] from an error kind and a static
/// description.
///
/// An optional third argument adds dynamic detail (converted with
/// `to_string`); `source:` attaches an underlying error.
#[macro_export]
macro_rules! nat_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::NatError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::NatError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::NatError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates a [`crate::error::NatError`] and returns it from the current
/// function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::nat_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::nat_error!($kind, $desc, $detail))
    };
}
