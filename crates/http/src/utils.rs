/// Returns early with `$error` unless `$predicate` holds.
///
/// ```ignore
/// ensure!(status.is_success(), HttpError::proxy("tunnel refused"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
