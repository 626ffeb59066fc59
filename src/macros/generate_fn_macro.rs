//! generate_fn_macro contains a simple macro that is used to generate a closure function
//! that we use for async routine building.
//! (use this macro with the caveat that variables captured inside the block are moved
//! into the closure, if you need to share them, clone them before invoking the macro).
/// Create a closure that returns the async routine of a timer by macro.
///
/// The block must evaluate to `anyhow::Result<()>`.
#[macro_export]
macro_rules! create_async_fn_body {
    ($async_body:block) => {
        move || async move { $async_body }
    };
}
