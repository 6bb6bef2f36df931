//! Authoring macros: `FILE_METADATA!`, `TEST!`, `REQUIRE!`, and `CHECK!`.
//!
//! `TEST!` expands to a `#[ctor::ctor]`-annotated function that runs before `main` and
//! registers its body with the process-wide [`crate::test_registry::GlobalRegistrar`] -- the
//! genuine static-initializer equivalent the original relies on, rather than something that
//! only fires on first incidental use of the module. Each generated function is wrapped in its
//! own `const _: () = { ... };` block so that multiple `TEST!` invocations in one module don't
//! collide on the function name: items declared inside such a block are scoped to it.

/// Declares the assignment every `TEST!` in the current module belongs to. Must appear once per
/// module, before any `TEST!` invocation.
#[macro_export]
macro_rules! FILE_METADATA {
    (Assignment($name:expr, $exec_path:expr)) => {
        fn __file_metadata() -> $crate::test_registry::TestMetadata {
            $crate::test_registry::TestMetadata {
                assignment_name: $name.to_string(),
                exec_path: $exec_path.to_string(),
                sequence: None,
            }
        }
    };
}

/// Registers a test body under the module's `FILE_METADATA!`-declared assignment. The body
/// receives `ctx: &mut TestContext` and `program: &mut Program` bound by name, matching the
/// original's implicit-`ctx` test-body convention.
#[macro_export]
macro_rules! TEST {
    ($name:expr, |$ctx:ident, $program:ident| $body:block) => {
        const _: () = {
            #[$crate::ctor::ctor]
            fn __register() {
                let metadata = __file_metadata();
                let mut registrar = $crate::test_registry::GlobalRegistrar::get().lock().unwrap();
                let idx = registrar.find_or_create_assignment(&metadata);
                registrar.assignments_mut()[idx].add_test($crate::test_registry::Test {
                    name: $name.to_string(),
                    metadata,
                    body: ::std::boxed::Box::new(
                        |$ctx: &mut $crate::test_registry::TestContext, $program: &mut $crate::program::Program| $body,
                    ),
                });
            }
        };
    };
}

/// Evaluates `cond` (a `bool`) and records it as a fatal expectation: on failure, this test (or
/// the whole run, depending on the configured [`crate::test_registry::StopOption`]) stops.
///
/// `cond` is taken as raw tokens rather than one opaque `expr` so a top-level `==`/`!=`/`<=`/`>=`
/// can be picked out and each side rendered separately (see [`crate::test_registry::Renderable`])
/// instead of recording only the source text of the whole condition.
#[macro_export]
macro_rules! REQUIRE {
    ($ctx:expr, $($cond:tt)+) => {
        $crate::__require_or_check!($ctx, true, $($cond)+)
    };
}

/// Evaluates `cond` and records it as a non-fatal expectation: the test always keeps running
/// regardless of the outcome.
#[macro_export]
macro_rules! CHECK {
    ($ctx:expr, $($cond:tt)+) => {
        $crate::__require_or_check!($ctx, false, $($cond)+)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __require_or_check {
    ($ctx:expr, $fatal:expr, $($cond:tt)+) => {
        $crate::__cmp_munch!(@acc [$ctx, $fatal, $($cond)+] [] $($cond)+)
    };
}

/// Scans `cond`'s tokens one tree at a time looking for a top-level comparison operator, the way
/// a recursive-descent tokenizer would, splitting into a rendered-operand comparison when one is
/// found and falling back to a plain `bool` evaluation otherwise. Only two-character operators are
/// matched (`==`, `!=`, `<=`, `>=`): a bare `<`/`>` is left alone since it's indistinguishable at
/// the token level from a turbofish (`Vec::<u8>::new()`).
#[doc(hidden)]
#[macro_export]
macro_rules! __cmp_munch {
    (@acc [$ctx:expr, $fatal:expr, $($all:tt)+] [$($lhs:tt)*] == $($rhs:tt)+) => {{
        let __lhs_val = $($lhs)*;
        let __rhs_val = $($rhs)+;
        let __passed: bool = __lhs_val == __rhs_val;
        $ctx.record_comparison(
            __passed,
            stringify!($($all)+),
            "==",
            $crate::test_registry::Renderable::render(&__lhs_val),
            $crate::test_registry::Renderable::render(&__rhs_val),
            $fatal,
        );
    }};
    (@acc [$ctx:expr, $fatal:expr, $($all:tt)+] [$($lhs:tt)*] != $($rhs:tt)+) => {{
        let __lhs_val = $($lhs)*;
        let __rhs_val = $($rhs)+;
        let __passed: bool = __lhs_val != __rhs_val;
        $ctx.record_comparison(
            __passed,
            stringify!($($all)+),
            "!=",
            $crate::test_registry::Renderable::render(&__lhs_val),
            $crate::test_registry::Renderable::render(&__rhs_val),
            $fatal,
        );
    }};
    (@acc [$ctx:expr, $fatal:expr, $($all:tt)+] [$($lhs:tt)*] <= $($rhs:tt)+) => {{
        let __lhs_val = $($lhs)*;
        let __rhs_val = $($rhs)+;
        let __passed: bool = __lhs_val <= __rhs_val;
        $ctx.record_comparison(
            __passed,
            stringify!($($all)+),
            "<=",
            $crate::test_registry::Renderable::render(&__lhs_val),
            $crate::test_registry::Renderable::render(&__rhs_val),
            $fatal,
        );
    }};
    (@acc [$ctx:expr, $fatal:expr, $($all:tt)+] [$($lhs:tt)*] >= $($rhs:tt)+) => {{
        let __lhs_val = $($lhs)*;
        let __rhs_val = $($rhs)+;
        let __passed: bool = __lhs_val >= __rhs_val;
        $ctx.record_comparison(
            __passed,
            stringify!($($all)+),
            ">=",
            $crate::test_registry::Renderable::render(&__lhs_val),
            $crate::test_registry::Renderable::render(&__rhs_val),
            $fatal,
        );
    }};
    (@acc [$ctx:expr, $fatal:expr, $($all:tt)+] [$($lhs:tt)*] $next:tt $($rest:tt)*) => {
        $crate::__cmp_munch!(@acc [$ctx, $fatal, $($all)+] [$($lhs)* $next] $($rest)*)
    };
    (@acc [$ctx:expr, $fatal:expr, $($all:tt)+] [$($lhs:tt)*]) => {{
        let __passed: bool = $($lhs)*;
        $ctx.record(__passed, stringify!($($all)+), $fatal);
    }};
}

#[cfg(test)]
mod tests {
    use crate::test_registry::{StopOption, TestContext};

    #[test]
    fn require_records_fatal_expectation() {
        let mut ctx = TestContext::new("thing", "t", StopOption::FirstError);
        REQUIRE!(ctx, 1 + 1 == 2);
        assert!(!ctx.is_stopped());
        REQUIRE!(ctx, 1 + 1 == 3);
        assert!(ctx.is_stopped());
    }

    #[test]
    fn check_never_stops_the_test() {
        let mut ctx = TestContext::new("thing", "t", StopOption::FirstError);
        CHECK!(ctx, 1 + 1 == 3);
        assert!(!ctx.is_stopped());
        assert_eq!(ctx.failed_count(), 1);
    }

    #[test]
    fn require_renders_comparison_operands() {
        let mut ctx = TestContext::new("thing", "t", StopOption::FirstError);
        CHECK!(ctx, 1 + 1 == 3);
        let recorded = &ctx.expectations()[0];
        let comparison = recorded.comparison.as_ref().expect("should have split lhs/rhs");
        assert_eq!(comparison.op, "==");
        assert_eq!(comparison.lhs, "2");
        assert_eq!(comparison.rhs, "3");
    }

    #[test]
    fn non_comparison_condition_falls_back_to_expression_text() {
        let mut ctx = TestContext::new("thing", "t", StopOption::FirstError);
        CHECK!(ctx, true);
        assert!(ctx.expectations()[0].comparison.is_none());
    }
}
