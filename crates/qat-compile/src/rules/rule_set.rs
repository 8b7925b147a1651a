//! Ordered collections of replacement rules.

use std::rc::Rc;

use qat_ir::{Builder, InstrId, Module};
use tracing::trace;

use super::pattern::Captures;
use super::rule::{ReplacementRule, Replacements};
use crate::error::CompileResult;

/// Shared handle to a rule.
pub type ReplacementRulePtr = Rc<ReplacementRule>;

/// Rules tried in registration order; the first rule that both matches and
/// replaces wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ReplacementRulePtr>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule.
    pub fn add_rule(&mut self, rule: ReplacementRulePtr) {
        self.rules.push(rule);
    }

    /// Try every rule on `instruction` until one replaces it.
    ///
    /// A rule that matches but whose replacer declines is skipped, and any
    /// replacements it scheduled before declining are dropped. The builder
    /// handed to replacers is positioned before `instruction`.
    pub fn match_and_replace(
        &self,
        module: &mut Module,
        instruction: InstrId,
        replacements: &mut Replacements,
    ) -> CompileResult<bool> {
        if module.instruction(instruction).is_erased() {
            return Ok(false);
        }

        let mut captures = Captures::default();
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.matches(module, instruction, &mut captures) {
                let scheduled = replacements.len();
                let mut builder = Builder::before(module, instruction);
                if rule.replace(&mut builder, instruction, &mut captures, replacements)? {
                    trace!("rule {index} replaced {instruction}");
                    return Ok(true);
                }
                replacements.truncate(scheduled);
            }
            captures.clear();
        }
        Ok(false)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Remove all rules.
    pub fn clear(&mut self) {
        self.rules.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use qat_ll::parse;

    use super::*;
    use crate::rules::notation::*;
    use crate::rules::rule::{ReplaceFn, Replacement};

    const SOURCE: &str = r"
%Result = type opaque

define i1 @Main(%Result* %r) {
entry:
  %one = call %Result* @__quantum__rt__result_get_one()
  %eq = call i1 @__quantum__rt__result_equal(%Result* %r, %Result* %one)
  ret i1 %eq
}

declare %Result* @__quantum__rt__result_get_one()
declare i1 @__quantum__rt__result_equal(%Result*, %Result*)
";

    fn find(module: &Module, name: &str) -> InstrId {
        let main = module.get_function("Main").unwrap();
        module
            .function_instructions(main)
            .into_iter()
            .find(|&i| module.instruction(i).name() == Some(name))
            .unwrap()
    }

    fn counting(counter: Rc<Cell<u32>>, result: bool) -> ReplaceFn {
        Rc::new(move |_builder, instruction, _captures, replacements| {
            counter.set(counter.get() + 1);
            replacements.push(Replacement::delete(instruction));
            Ok(result)
        })
    }

    #[test]
    fn test_first_match_wins() {
        let mut module = parse(SOURCE).unwrap();
        let eq = find(&module, "eq");
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let mut rules = RuleSet::new();
        let pattern = call_by_name_only("__quantum__rt__result_equal");
        rules.add_rule(Rc::new(ReplacementRule::new(pattern.clone(), counting(first.clone(), true))));
        rules.add_rule(Rc::new(ReplacementRule::new(pattern, counting(second.clone(), true))));

        let mut replacements = Replacements::new();
        assert!(rules.match_and_replace(&mut module, eq, &mut replacements).unwrap());
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
        assert_eq!(replacements, vec![Replacement::delete(eq)]);
    }

    #[test]
    fn test_declined_replacement_falls_through() {
        let mut module = parse(SOURCE).unwrap();
        let eq = find(&module, "eq");
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let mut rules = RuleSet::new();
        let pattern = call_by_name_only("__quantum__rt__result_equal");
        rules.add_rule(Rc::new(ReplacementRule::new(pattern.clone(), counting(first.clone(), false))));
        rules.add_rule(Rc::new(ReplacementRule::new(pattern, counting(second.clone(), true))));

        let mut replacements = Replacements::new();
        assert!(rules.match_and_replace(&mut module, eq, &mut replacements).unwrap());
        assert_eq!((first.get(), second.get()), (1, 1));
        // The declined rule's scheduled deletion was dropped.
        assert_eq!(replacements.len(), 1);
    }

    #[test]
    fn test_no_rule_matches() {
        let mut module = parse(SOURCE).unwrap();
        let one = find(&module, "one");
        let mut rules = RuleSet::new();
        rules.add_rule(Rc::new(ReplacementRule::new(
            call_by_name_only("__quantum__rt__result_equal"),
            delete_instruction(),
        )));
        rules.add_rule(Rc::new(ReplacementRule::default()));

        let mut replacements = Replacements::new();
        assert!(!rules.match_and_replace(&mut module, one, &mut replacements).unwrap());
        assert!(replacements.is_empty());
        assert_eq!(rules.len(), 2);
        rules.clear();
        assert!(rules.is_empty());
    }
}
