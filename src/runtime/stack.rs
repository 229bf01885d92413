//! Keeps deeply nested evaluation off the end of the native stack.
//!
//! Nesting depth is only bounded by the program being run, so every recursive step of the
//! interpreter goes through [`ensure_sufficient_stack`], which switches to a freshly allocated
//! segment when the current one runs low.

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Remaining stack below which a new segment is allocated
    const RED_ZONE: usize = 128 * 1024;
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::ensure_sufficient_stack;

    fn nest(depth: usize) -> usize {
        ensure_sufficient_stack(|| {
            let padding = [depth; 64];
            if depth == 0 {
                0
            } else {
                nest(depth - 1) + 1 + padding[63] - depth
            }
        })
    }

    #[test]
    fn nests_past_the_thread_stack() {
        check!(nest(200_000) == 200_000);
    }
}
