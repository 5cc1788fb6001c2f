//! Per-query semantic analysis
//!
//! [`Analyzer::analyze`] runs the passes over one [`QueryBlock`] in a fixed
//! order: base scope, CTEs, segment scopes, output columns, parameters and
//! finally identifier validation. Every pass reports into the same
//! [`DiagnosticCollector`], so repeated findings collapse into one.

use log::debug;
use serde::Serialize;
use sqlty_ast::{Catalog, ColumnExpr, QueryBlock, QueryVerb, Token, TokenKind};
use sqlty_diagnostics::{Diagnostic, DiagnosticCollector, SQL0010, SQL0100, SQL0104, SQL0110};
use sqlty_parser::scan::{find_top_level, statement_start};
use sqlty_parser::{parse_projection, tokenize_at};
use sqlty_types::{TypeInfo, TypeResolver};

use crate::columns::{Mode, Resolution, ResultColumn};
use crate::cte::resolve_ctes;
use crate::params::{annotated_params, ParamResolver, ResultParam};
use crate::scope::{ColumnOverrides, Scope};
use crate::segments::split_segments;
use crate::validator::Validator;

/// Typed output of one analyzed query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub columns: Vec<ResultColumn>,
    pub params: Vec<ResultParam>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Semantic analyzer over a shared, read-only catalog.
///
/// The analyzer holds no per-query state; one instance can analyze any
/// number of queries, from several threads at once.
#[derive(Clone, Copy)]
pub struct Analyzer<'a> {
    catalog: Option<&'a Catalog>,
    resolver: &'a dyn TypeResolver,
    overrides: Option<&'a ColumnOverrides>,
}

impl<'a> Analyzer<'a> {
    /// Create an analyzer; without a catalog every type stays unresolved
    pub fn new(catalog: Option<&'a Catalog>, resolver: &'a dyn TypeResolver) -> Self {
        Self {
            catalog,
            resolver,
            overrides: None,
        }
    }

    /// Use global `table.column` type overrides
    pub fn with_overrides(mut self, overrides: &'a ColumnOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn analyze(&self, block: &QueryBlock) -> AnalysisResult {
        let mut diags = DiagnosticCollector::new(block.path.clone());
        let tokens = match tokenize_at(&block.sql, block.position) {
            Ok(tokens) => tokens,
            Err(err) => {
                diags.push(err.to_diagnostic(&block.path));
                return AnalysisResult {
                    diagnostics: diags.into_diagnostics(),
                    ..AnalysisResult::default()
                };
            }
        };
        let returning = returning_clause(block, &tokens);

        let (mut columns, params) = match self.catalog {
            Some(catalog) => self.analyze_with_catalog(catalog, block, &tokens, &returning, &mut diags),
            None => {
                diags.warning(
                    SQL0110,
                    block.position,
                    "no schema catalog available; types are unresolved",
                );
                self.analyze_without_catalog(block, &tokens, &returning, &mut diags)
            }
        };
        self.apply_column_overrides(block, &mut columns, &mut diags);

        debug!(
            "analyzed {}: {} columns, {} params, {} diagnostics",
            block.name,
            columns.len(),
            params.len(),
            diags.len()
        );
        AnalysisResult {
            columns,
            params,
            diagnostics: diags.into_diagnostics(),
        }
    }

    fn analyze_with_catalog(
        &self,
        catalog: &Catalog,
        block: &QueryBlock,
        tokens: &[Token],
        returning: &[ColumnExpr],
        diags: &mut DiagnosticCollector,
    ) -> (Vec<ResultColumn>, Vec<ResultParam>) {
        let empty = ColumnOverrides::new();
        let mut base = Scope::from_catalog(catalog, self.resolver, self.overrides.unwrap_or(&empty));
        resolve_ctes(&block.query, &mut base, self.resolver, diags);

        let segments = split_segments(tokens, &base);
        for segment in segments.iter().filter(|s| !s.ordering) {
            for missing in segment.scope.missing() {
                diags.error(SQL0100, missing.position, format!("unknown table '{}'", missing.name));
            }
        }

        let mut res = Resolution {
            scope: segments.first().map_or(&base, |s| &s.scope),
            resolver: self.resolver,
            mode: Mode::Query,
            diags: &mut *diags,
        };
        let mut columns = res.resolve_projection(&block.query.columns);
        columns.extend(res.resolve_projection(returning));

        let params = ParamResolver {
            tokens,
            segments: &segments,
            base: &base,
            catalog,
            resolver: self.resolver,
        }
        .resolve(block, diags);

        if block.verb() != QueryVerb::Other {
            for segment in &segments {
                let mut validator = Validator::new(&segment.scope, &block.query, returning);
                if segment.ordering {
                    validator = validator.with_outputs(columns.iter().map(|c| c.name.as_str()));
                }
                for range in &segment.ranges {
                    validator.validate(&tokens[range.clone()], diags);
                }
            }
        }
        (columns, params)
    }

    fn analyze_without_catalog(
        &self,
        block: &QueryBlock,
        tokens: &[Token],
        returning: &[ColumnExpr],
        diags: &mut DiagnosticCollector,
    ) -> (Vec<ResultColumn>, Vec<ResultParam>) {
        let columns = block
            .query
            .columns
            .iter()
            .chain(returning)
            .filter(|c| !c.star)
            .enumerate()
            .map(|(i, c)| {
                let name = c
                    .alias
                    .clone()
                    .or_else(|| c.name.clone())
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                ResultColumn::new(name, c.table.clone().unwrap_or_default(), TypeInfo::Unresolved)
            })
            .collect();

        let params = annotated_params(block, tokens, self.resolver, diags);
        (columns, params)
    }

    /// `-- @column name type [null]` annotations
    fn apply_column_overrides(
        &self,
        block: &QueryBlock,
        columns: &mut [ResultColumn],
        diags: &mut DiagnosticCollector,
    ) {
        for o in &block.column_overrides {
            let Some(column) = columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&o.name)) else {
                diags.warning(
                    SQL0010,
                    o.position,
                    format!("annotation names unknown output column '{}'", o.name),
                );
                continue;
            };
            match self.resolver.named_type(&o.type_name) {
                Some(ty) => column.ty = TypeInfo::new(ty, o.nullable),
                None => diags.warning(
                    SQL0104,
                    o.position,
                    format!("unknown type '{}' for column '{}'", o.type_name, o.name),
                ),
            }
        }
    }
}

/// Projection of the `RETURNING` clause of a mutation
fn returning_clause(block: &QueryBlock, tokens: &[Token]) -> Vec<ColumnExpr> {
    if !block.verb().is_mutation() {
        return Vec::new();
    }
    let main = &tokens[statement_start(tokens)..];
    let Some(at) = find_top_level(main, |t| t.is_word("RETURNING")) else {
        return Vec::new();
    };
    let rest = &main[at + 1..];
    let end = rest
        .iter()
        .position(|t| t.kind == TokenKind::Semicolon)
        .unwrap_or(rest.len());
    parse_projection(&block.sql, &rest[..end])
}
