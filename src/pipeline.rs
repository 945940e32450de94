//! The fixed sequence of rewrite passes.
//!
//! Order matters: procedural shaping comes first because later passes
//! expect block-wrapped routine bodies; declarations are consolidated
//! before they turn into assignments; control flow is wrapped before its
//! keywords are replaced; names and types are translated last because
//! earlier passes synthesize nodes that still use source vocabulary.

use crate::error::ConvertResult;
use crate::passes::{
    Pass, PassContext, cleanup, control_flow, declarations, dml, exceptions, functions, json,
    pivot, procedural, select, table_vars,
};
use crate::tree::Tree;

const STANDARD: &[Pass] = &[
    Pass::new("procedural_blocks", procedural::convert_procedural_blocks),
    Pass::new("ddl_parens", procedural::force_ddl_parens),
    Pass::new("language_clause", procedural::add_language_clause),
    Pass::new("ddl_begin_end", procedural::force_ddl_begin_end),
    Pass::new("block_wrapper", procedural::add_block_wrapper),
    Pass::new("result_sets", procedural::capture_result_sets),
    Pass::new("declare_section", declarations::add_declare_section),
    Pass::new("table_variables", table_vars::convert_table_variables),
    Pass::new("unnest_arrays", table_vars::unnest_arrays),
    Pass::new("declare_to_assign", declarations::convert_declare_to_assign),
    Pass::new("set_to_assign", declarations::convert_set_to_assign),
    Pass::new("cleanup_declare", declarations::cleanup_declare_statements),
    Pass::new("guarded_drop", control_flow::convert_guarded_drop),
    Pass::new("if_begin_end", control_flow::force_if_begin_end),
    Pass::new("conditions", control_flow::convert_conditions),
    Pass::new("select", select::update_select_statements),
    Pass::new("pivot", pivot::convert_pivot),
    Pass::new("unpivot", pivot::convert_unpivot),
    Pass::new("delete", dml::convert_delete),
    Pass::new("temp_tables", dml::convert_temp_tables),
    Pass::new("loops", control_flow::convert_loops),
    Pass::new("update_from", dml::convert_update_from),
    Pass::new("unnecessary_statements", cleanup::remove_unnecessary_statements),
    Pass::new("mapped_functions", functions::convert_mapped_functions),
    Pass::new("string_agg", functions::convert_string_agg),
    Pass::new("for_xml_path", functions::convert_for_xml_path),
    Pass::new("format", functions::convert_format),
    Pass::new("datepart", functions::convert_datepart),
    Pass::new("dateadd", functions::convert_dateadd),
    Pass::new("datediff", functions::convert_datediff),
    Pass::new("iif", functions::convert_iif),
    Pass::new("stuff", functions::convert_stuff),
    Pass::new("procedure_calls", dml::convert_procedure_calls),
    Pass::new("insert_into_arrays", table_vars::insert_into_arrays),
    Pass::new("transactions", exceptions::convert_transactions),
    Pass::new("try_catch", exceptions::convert_try_catch),
    Pass::new("output_parameters", dml::convert_output_parameters),
    Pass::new("json_functions", json::convert_json_functions),
    Pass::new("for_json", json::convert_for_json),
    Pass::new("output_clause", dml::convert_output_clause),
    Pass::new("ddl_other_block_semicolon", cleanup::fix_ddl_other_block_semicolon),
    Pass::new("missing_semicolons", cleanup::add_missing_semicolons),
    Pass::new("cast", functions::convert_cast),
    Pass::new("try_cast", functions::convert_try_cast),
    Pass::new("names", cleanup::update_names),
    Pass::new("data_types", functions::convert_data_types),
    Pass::new("identity", functions::convert_identity),
    Pass::new("nstrings", cleanup::convert_nstrings),
    Pass::new("commas_after_comments", cleanup::fix_commas_after_comments),
    Pass::new("semicolons_after_comments", cleanup::fix_semicolons_after_comments),
];

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    /// Approximate conversions; each left a warning comment in the tree.
    pub warnings: usize,
}

/// An ordered list of passes.
#[derive(Debug, Clone)]
pub struct Pipeline {
    passes: Vec<Pass>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    /// The full T-SQL to PL/pgSQL conversion.
    pub fn standard() -> Self {
        Self {
            passes: STANDARD.to_vec(),
        }
    }

    pub fn empty() -> Self {
        Self { passes: Vec::new() }
    }

    /// Append a pass.
    pub fn with(mut self, pass: Pass) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Run every pass once, in order, mutating `tree` in place.
    ///
    /// Stops at the first failing pass; the error names it.
    pub fn run(&self, tree: &mut Tree) -> ConvertResult<Conversion> {
        let mut ctx = PassContext::default();
        for pass in &self.passes {
            let span = tracing::debug_span!("pass", name = pass.name);
            let _enter = span.enter();
            (pass.run)(tree, &mut ctx).map_err(|e| e.in_pass(pass.name))?;
            tracing::debug!("Pass {} done, {} nodes", pass.name, tree.len());
        }
        tracing::info!(
            "Converted tree with {} passes, {} warnings",
            self.passes.len(),
            ctx.warnings
        );
        Ok(Conversion {
            warnings: ctx.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::tree::{Tag, notation};

    fn failing(_tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
        Err(ConvertError::shape("expected nothing"))
    }

    fn warning(_tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
        ctx.warn("test");
        Ok(())
    }

    #[test]
    fn test_standard_order() {
        let pipeline = Pipeline::standard();
        let names: Vec<&str> = pipeline.passes().iter().map(|p| p.name).collect();
        let position = |name: &str| names.iter().position(|n| *n == name).unwrap();

        assert_eq!(names.first(), Some(&"procedural_blocks"));
        assert!(position("result_sets") < position("declare_section"));
        assert!(position("declare_section") < position("declare_to_assign"));
        assert!(position("declare_to_assign") < position("cleanup_declare"));
        assert!(position("if_begin_end") < position("conditions"));
        assert!(position("missing_semicolons") < position("names"));
        assert!(position("names") < position("data_types"));
    }

    #[test]
    fn test_pass_names_are_unique() {
        let pipeline = Pipeline::standard();
        let mut names: Vec<&str> = pipeline.passes().iter().map(|p| p.name).collect();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn test_error_names_failing_pass() {
        let mut tree = Tree::with_root(Tag::Root, "");
        let pipeline = Pipeline::empty()
            .with(Pass::new("warning", warning))
            .with(Pass::new("failing", failing));
        let err = pipeline.run(&mut tree).unwrap_err();
        assert!(matches!(err, ConvertError::Pass { pass: "failing", .. }));
    }

    #[test]
    fn test_warnings_are_counted() {
        let mut tree = notation::parse("(Root)").unwrap();
        let pipeline = Pipeline::empty()
            .with(Pass::new("first", warning))
            .with(Pass::new("second", warning));
        let conversion = pipeline.run(&mut tree).unwrap();
        assert_eq!(conversion.warnings, 2);
    }

    #[test]
    fn test_standard_pipeline_on_empty_tree() {
        let mut tree = Tree::with_root(Tag::Root, "");
        let conversion = Pipeline::standard().run(&mut tree).unwrap();
        assert_eq!(conversion, Conversion::default());
    }
}
