//! Short-circuiting step composition for action bodies.
//!
//! Action bodies are written as a pipeline of steps. Each step receives the
//! action and the request context and either succeeds or returns a
//! [`Problem`], which lands in the context's error slot and stops the
//! pipeline.

use crate::context::RequestContext;
use crate::problem::Problem;

pub type StepResult = Result<(), Problem>;

/// A single unit of work in an action pipeline.
pub type Step<'s, A> = &'s mut dyn FnMut(&mut A, &mut RequestContext) -> StepResult;

impl RequestContext {
    /// Run `steps` in order, stopping before the first step that would run
    /// with the error slot already set.
    pub fn run<A: ?Sized>(&mut self, target: &mut A, steps: &mut [Step<'_, A>]) {
        for step in steps {
            if self.has_error() {
                return;
            }
            if let Err(problem) = step(target, self) {
                self.fail(problem);
            }
        }
    }

    /// Like [`run`](Self::run), but only the first call on this context does
    /// anything. Later calls are no-ops even if the first call failed.
    pub fn setup<A: ?Sized>(&mut self, target: &mut A, steps: &mut [Step<'_, A>]) {
        if self.setup_done {
            return;
        }
        self.run(target, steps);
        self.setup_done = true;
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::negotiate::Representation;

    fn context() -> RequestContext {
        RequestContext::new(Representation::Structured, CancellationToken::new())
    }

    fn push_a(log: &mut Vec<&'static str>, _: &mut RequestContext) -> StepResult {
        log.push("a");
        Ok(())
    }

    fn push_b(log: &mut Vec<&'static str>, _: &mut RequestContext) -> StepResult {
        log.push("b");
        Ok(())
    }

    fn fail_missing(log: &mut Vec<&'static str>, _: &mut RequestContext) -> StepResult {
        log.push("fail");
        Err(Problem::not_found())
    }

    #[test]
    fn run_executes_all_steps_without_errors() {
        let mut ctx = context();
        let mut log = Vec::new();
        ctx.run(&mut log, &mut [&mut push_a, &mut push_b, &mut push_a]);
        assert_eq!(log, ["a", "b", "a"]);
        assert!(!ctx.has_error());
    }

    #[test]
    fn run_stops_after_failing_step() {
        let mut ctx = context();
        let mut log = Vec::new();
        ctx.run(&mut log, &mut [&mut push_a, &mut fail_missing, &mut push_b]);
        assert_eq!(log, ["a", "fail"]);
        assert_eq!(ctx.error(), Some(&Problem::not_found()));
    }

    #[test]
    fn run_is_skipped_entirely_when_error_already_set() {
        let mut ctx = context();
        ctx.fail(Problem::stale_history());
        let mut log = Vec::new();
        ctx.run(&mut log, &mut [&mut push_a]);
        assert!(log.is_empty());
        assert_eq!(ctx.error(), Some(&Problem::stale_history()));
    }

    #[test]
    fn closures_can_borrow_request_locals() {
        let mut ctx = context();
        let mut log = Vec::new();
        let mut seen = 0;
        ctx.run(
            &mut log,
            &mut [&mut push_a, &mut |log: &mut Vec<&'static str>, _: &mut RequestContext| -> StepResult {
                seen = log.len();
                Ok(())
            }],
        );
        assert_eq!(seen, 1);
    }

    #[test]
    fn setup_runs_at_most_once() {
        let mut ctx = context();
        let mut log = Vec::new();
        ctx.setup(&mut log, &mut [&mut push_a]);
        ctx.setup(&mut log, &mut [&mut push_a]);
        ctx.setup(&mut log, &mut [&mut push_b, &mut push_b]);
        assert_eq!(log, ["a"]);
    }

    #[test]
    fn setup_is_done_even_when_it_failed() {
        let mut ctx = context();
        let mut log = Vec::new();
        ctx.setup(&mut log, &mut [&mut fail_missing, &mut push_a]);
        ctx.setup(&mut log, &mut [&mut push_b]);
        assert_eq!(log, ["fail"]);
        assert!(ctx.has_error());
    }

    #[test]
    fn run_still_works_after_setup() {
        let mut ctx = context();
        let mut log = Vec::new();
        ctx.setup(&mut log, &mut [&mut push_a]);
        ctx.run(&mut log, &mut [&mut push_b]);
        ctx.run(&mut log, &mut [&mut push_b]);
        assert_eq!(log, ["a", "b", "b"]);
    }
}
