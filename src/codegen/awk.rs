//! awk backend: fused column-level operations.
//!
//! One subtree — parse binding, any number of filters, a projection,
//! optionally a group-by — becomes exactly one awk invocation. Filters
//! fuse into a single conjunction guarding the action; group-bys
//! accumulate into associative arrays keyed by the (possibly composite,
//! SUBSEP-joined) group key and emit in an END block.

use crate::codegen::quote::{escape_awk_regex, escape_awk_string, sh_quote};
use crate::error::{SparkError, SparkResult};
use crate::format::{adapter_for, output_delimiter, FormatAdapter};
use crate::plan::{
    AggFunc, Aggregation, ColumnRef, FilterOp, FilterValue, PlanNode,
};
use crate::tools;

/// Flattened view of one fused subtree, collected root-to-source.
struct FusedOps<'a> {
    filters: Vec<FilterSpec<'a>>,
    /// Projection applied to group-by output (appears above the GroupBy)
    select_over_groups: Option<&'a [ColumnRef]>,
    /// Projection of raw fields (no GroupBy below it)
    select: Option<&'a [ColumnRef]>,
    group_by: Option<(&'a [ColumnRef], &'a [Aggregation])>,
    source_path: Option<&'a str>,
}

struct FilterSpec<'a> {
    column: Option<&'a ColumnRef>,
    op: FilterOp,
    value: &'a FilterValue,
    case_sensitive: bool,
}

fn collect_ops(node: &PlanNode) -> SparkResult<FusedOps<'_>> {
    let mut ops = FusedOps {
        filters: Vec::new(),
        select_over_groups: None,
        select: None,
        group_by: None,
        source_path: None,
    };
    let mut current = node;
    loop {
        match current {
            PlanNode::Filter {
                child,
                column,
                op,
                value,
                case_sensitive,
            } => {
                ops.filters.push(FilterSpec {
                    column: column.as_ref(),
                    op: *op,
                    value,
                    case_sensitive: *case_sensitive,
                });
                current = child.as_ref();
            }
            PlanNode::Select { child, columns } => {
                // The outermost projection on each side of the group-by
                // wins; inner ones neither rename nor renumber
                // header-resolved fields.
                if ops.group_by.is_none() {
                    if ops.select_over_groups.is_none() {
                        ops.select_over_groups = Some(columns);
                    }
                } else if ops.select.is_none() {
                    ops.select = Some(columns);
                }
                current = child.as_ref();
            }
            PlanNode::GroupBy {
                child,
                keys,
                aggregations,
            } => {
                if ops.group_by.is_some() {
                    return Err(SparkError::Compile(
                        "nested group_by() without an intervening barrier".to_string(),
                    ));
                }
                current = child.as_ref();
                ops.group_by = Some((keys, aggregations));
            }
            PlanNode::Parse { child, .. } => {
                current = child.as_ref();
            }
            PlanNode::Source { path, .. } => {
                ops.source_path = Some(path);
                break;
            }
            other => {
                return Err(SparkError::Compile(format!(
                    "awk backend cannot handle {} node",
                    other.kind_name()
                )))
            }
        }
    }
    // When there is no group-by, the single projection slot applies to
    // raw fields.
    if ops.group_by.is_none() {
        ops.select = ops.select_over_groups.take();
    }
    // Conjunction order follows the plan source-to-root.
    ops.filters.reverse();
    Ok(ops)
}

/// Compile a fused subtree into a single awk invocation.
pub(crate) fn generate(node: &PlanNode) -> SparkResult<String> {
    let awk = tools::detect_awk()?;
    let ops = collect_ops(node)?;
    let adapter = adapter_for(node);
    let out_delim = output_delimiter(node);

    let mut script_parts: Vec<String> = Vec::new();
    if let Some(preamble) = adapter.header_preamble() {
        script_parts.push(preamble.to_string());
    }

    let mut conditions = Vec::with_capacity(ops.filters.len());
    for filter in &ops.filters {
        conditions.push(predicate(adapter.as_ref(), filter)?);
    }
    let condition = conditions.join(" && ");

    if let Some((keys, aggregations)) = ops.group_by {
        if ops.select.is_some() {
            // A projection below the group-by neither renames nor drops
            // header-resolved fields, so the aggregation reads through it.
            tracing::debug!("select() below group_by() has no effect on generated awk");
        }
        let (main_action, end_block) = group_by_script(
            adapter.as_ref(),
            keys,
            aggregations,
            ops.select_over_groups,
            &out_delim,
        )?;
        script_parts.push(format!("{condition}{{{main_action}}}"));
        script_parts.push(end_block);
    } else {
        let action = print_action(adapter.as_ref(), ops.select, &out_delim)?;
        script_parts.push(format!("{condition}{{{action}}}"));
    }

    let script = script_parts.join(" ");

    let mut cmd_parts = vec![awk.path.display().to_string()];
    if let Some(sep) = adapter.field_separator() {
        cmd_parts.push(format!("-F{}", sh_quote(sep)));
    }
    cmd_parts.push(sh_quote(&script));
    if let Some(path) = ops.source_path {
        cmd_parts.push(sh_quote(path));
    }
    Ok(cmd_parts.join(" "))
}

/// Translate one filter into an awk boolean expression.
fn predicate(adapter: &dyn FormatAdapter, filter: &FilterSpec<'_>) -> SparkResult<String> {
    let raw_field = match filter.column {
        Some(column) => adapter.field_ref(column)?,
        None => "$0".to_string(),
    };

    // awk has no case flag; fold both sides for the string operations.
    let fold = !filter.case_sensitive && filter.value.is_string();
    let field = if fold {
        format!("tolower({raw_field})")
    } else {
        raw_field
    };
    let literal = value_literal(filter.value, fold);

    Ok(match filter.op {
        FilterOp::Eq => format!("{field}=={literal}"),
        FilterOp::Ne => format!("{field}!={literal}"),
        FilterOp::Lt => format!("{field}<{literal}"),
        FilterOp::Le => format!("{field}<={literal}"),
        FilterOp::Gt => format!("{field}>{literal}"),
        FilterOp::Ge => format!("{field}>={literal}"),
        FilterOp::Contains => format!("index({field},{literal})>0"),
        FilterOp::StartsWith => format!("index({field},{literal})==1"),
        FilterOp::EndsWith => format!(
            "substr({field},length({field})-length({literal})+1)=={literal}"
        ),
        FilterOp::Regex => {
            let mut body = filter.value.raw();
            if fold {
                body = body.to_lowercase();
            }
            format!("{field}~/{}/", escape_awk_regex(&body))
        }
    })
}

/// Render a filter value as an awk literal: strings quoted and escaped,
/// numbers bare.
fn value_literal(value: &FilterValue, lowercase: bool) -> String {
    match value {
        FilterValue::Str(s) => {
            let s = if lowercase { s.to_lowercase() } else { s.clone() };
            format!("\"{}\"", escape_awk_string(&s))
        }
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Float(f) => f.to_string(),
    }
}

/// The per-row action for a plain (non-aggregating) stage.
fn print_action(
    adapter: &dyn FormatAdapter,
    select: Option<&[ColumnRef]>,
    out_delim: &str,
) -> SparkResult<String> {
    let Some(columns) = select else {
        return Ok("print".to_string());
    };
    let refs = columns
        .iter()
        .map(|c| adapter.field_ref(c))
        .collect::<SparkResult<Vec<_>>>()?;
    let sep = format!("\"{}\"", escape_awk_string(out_delim));
    Ok(format!("print {}", refs.join(&format!(" {sep} "))))
}

/// Sanitized `[A-Za-z0-9_]+` base for accumulator array names.
fn sanitize_name(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

struct AggCode {
    update: String,
    /// END-block statements computed before the print (COUNTDISTINCT)
    prelude: Option<String>,
    emit: String,
}

fn agg_code(adapter: &dyn FormatAdapter, agg: &Aggregation) -> SparkResult<AggCode> {
    let base = sanitize_name(&agg.alias);
    let prefix = agg.func.array_prefix();

    // COUNT is the only aggregation that reads no field.
    let Some(column) = &agg.column else {
        if agg.func == AggFunc::Count {
            return Ok(AggCode {
                update: format!("{prefix}_{base}[k]++"),
                prelude: None,
                emit: format!("{prefix}_{base}[k]"),
            });
        }
        return Err(SparkError::Compile(format!(
            "{:?} aggregation requires a column",
            agg.func
        )));
    };
    let f = adapter.field_ref(column)?;

    Ok(match agg.func {
        AggFunc::Count => AggCode {
            update: format!("{prefix}_{base}[k]++"),
            prelude: None,
            emit: format!("{prefix}_{base}[k]"),
        },
        AggFunc::Sum => AggCode {
            update: format!("{prefix}_{base}[k]+={f}"),
            prelude: None,
            emit: format!("{prefix}_{base}[k]"),
        },
        AggFunc::Avg => AggCode {
            update: format!("avg_sum_{base}[k]+={f}; avg_cnt_{base}[k]++"),
            prelude: None,
            emit: format!("avg_sum_{base}[k]/avg_cnt_{base}[k]"),
        },
        AggFunc::Min => AggCode {
            update: format!(
                "if(!min_seen_{base}[k]||{f}+0<min_{base}[k]+0){{min_{base}[k]={f}; min_seen_{base}[k]=1}}"
            ),
            prelude: None,
            emit: format!("min_{base}[k]"),
        },
        AggFunc::Max => AggCode {
            update: format!(
                "if(!max_seen_{base}[k]||{f}+0>max_{base}[k]+0){{max_{base}[k]={f}; max_seen_{base}[k]=1}}"
            ),
            prelude: None,
            emit: format!("max_{base}[k]"),
        },
        AggFunc::First => AggCode {
            update: format!(
                "if(!first_seen_{base}[k]){{first_{base}[k]={f}; first_seen_{base}[k]=1}}"
            ),
            prelude: None,
            emit: format!("first_{base}[k]"),
        },
        AggFunc::Last => AggCode {
            update: format!("last_{base}[k]={f}"),
            prelude: None,
            emit: format!("last_{base}[k]"),
        },
        AggFunc::CountDistinct => AggCode {
            update: format!("cd_{base}[k,{f}]=1"),
            prelude: Some(format!(
                "n_{base}=0; for(c in cd_{base}) if(substr(c,1,length(k)+1)==k SUBSEP) n_{base}++"
            )),
            emit: format!("n_{base}"),
        },
    })
}

/// Build the per-row accumulation action and the END emission block.
fn group_by_script(
    adapter: &dyn FormatAdapter,
    keys: &[ColumnRef],
    aggregations: &[Aggregation],
    projection: Option<&[ColumnRef]>,
    out_delim: &str,
) -> SparkResult<(String, String)> {
    let key_refs = keys
        .iter()
        .map(|k| adapter.field_ref(k))
        .collect::<SparkResult<Vec<_>>>()?;
    let key_expr = if key_refs.len() == 1 {
        key_refs[0].clone()
    } else {
        format!("({})", key_refs.join(" SUBSEP "))
    };

    let agg_codes = aggregations
        .iter()
        .map(|a| agg_code(adapter, a))
        .collect::<SparkResult<Vec<_>>>()?;

    let mut updates = vec![format!("k={key_expr}")];
    updates.extend(agg_codes.iter().map(|c| c.update.clone()));
    updates.push("_keys[k]=1".to_string());
    let main_action = updates.join("; ");

    // Output expressions in schema order: keys, then aggregates.
    let mut emits: Vec<String> = if keys.len() == 1 {
        vec!["k".to_string()]
    } else {
        (1..=keys.len()).map(|i| format!("ks[{i}]")).collect()
    };
    emits.extend(agg_codes.iter().map(|c| c.emit.clone()));

    // An outer projection narrows the emitted columns via the group-by
    // output schema.
    let emits = match projection {
        None => emits,
        Some(columns) => {
            let schema = crate::plan::group_by_schema(keys, aggregations);
            let mut chosen = Vec::with_capacity(columns.len());
            for column in columns {
                let position = match column {
                    ColumnRef::Name(name) => {
                        schema.iter().position(|s| s == name).ok_or_else(|| {
                            SparkError::ColumnResolution {
                                column: name.clone(),
                                reason: format!(
                                    "not in the group_by output schema ({})",
                                    schema.join(", ")
                                ),
                            }
                        })?
                    }
                    ColumnRef::Index(i) if (1..=emits.len()).contains(i) => i - 1,
                    ColumnRef::Index(i) => {
                        return Err(SparkError::ColumnResolution {
                            column: i.to_string(),
                            reason: format!(
                                "group_by output has {} columns",
                                emits.len()
                            ),
                        })
                    }
                };
                chosen.push(emits[position].clone());
            }
            chosen
        }
    };

    let sep = format!("\"{}\"", escape_awk_string(out_delim));
    let print_stmt = format!("print {}", emits.join(&format!(" {sep} ")));

    let mut end_body = Vec::new();
    if keys.len() > 1 {
        end_body.push("split(k,ks,SUBSEP)".to_string());
    }
    end_body.extend(agg_codes.iter().filter_map(|c| c.prelude.clone()));
    end_body.push(print_stmt);

    let end_block = format!("END{{for(k in _keys){{{}}}}}", end_body.join("; "));
    Ok((main_action, end_block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Format;

    fn csv_source(path: &str) -> PlanNode {
        PlanNode::Parse {
            child: Box::new(PlanNode::Source {
                path: path.to_string(),
                format: Format::Csv,
            }),
            format: Format::Csv,
            delimiter: ",".to_string(),
            has_header: true,
        }
    }

    fn named(name: &str) -> ColumnRef {
        ColumnRef::Name(name.to_string())
    }

    #[test]
    fn test_header_preamble_and_named_filter() {
        let plan = PlanNode::Filter {
            child: Box::new(csv_source("data.csv")),
            column: Some(named("status")),
            op: FilterOp::Eq,
            value: FilterValue::Str("active".to_string()),
            case_sensitive: true,
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains("NR==1{for(i=1;i<=NF;i++)h[$i]=i; next}"),
            "command: {cmd}"
        );
        assert!(cmd.contains(r#"$h["status"]=="active""#), "command: {cmd}");
        assert!(cmd.contains("-F','"), "command: {cmd}");
        assert!(cmd.ends_with("'data.csv'"), "command: {cmd}");
    }

    #[test]
    fn test_filters_fuse_into_one_conjunction() {
        let plan = PlanNode::Filter {
            child: Box::new(PlanNode::Filter {
                child: Box::new(csv_source("data.csv")),
                column: Some(named("quantity")),
                op: FilterOp::Gt,
                value: FilterValue::Int(0),
                case_sensitive: true,
            }),
            column: Some(named("region")),
            op: FilterOp::Ne,
            value: FilterValue::Str("TEST".to_string()),
            case_sensitive: true,
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains(r#"$h["quantity"]>0 && $h["region"]!="TEST""#),
            "command: {cmd}"
        );
        // One awk invocation, no pipe.
        assert!(!cmd.contains(" | "), "command: {cmd}");
    }

    #[test]
    fn test_whole_line_comparison_uses_dollar_zero() {
        let plan = PlanNode::Filter {
            child: Box::new(PlanNode::Source {
                path: "nums.txt".to_string(),
                format: Format::Text,
            }),
            column: None,
            op: FilterOp::Ge,
            value: FilterValue::Int(100),
            case_sensitive: true,
        };
        let cmd = generate(&plan).expect("compile");
        assert!(cmd.contains("$0>=100"), "command: {cmd}");
    }

    #[test]
    fn test_select_projects_fields_with_delimiter() {
        let plan = PlanNode::Select {
            child: Box::new(csv_source("data.csv")),
            columns: vec![named("name"), named("age")],
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains(r#"print $h["name"] "," $h["age"]"#),
            "command: {cmd}"
        );
    }

    #[test]
    fn test_text_select_uses_indices_and_space() {
        let plan = PlanNode::Select {
            child: Box::new(PlanNode::Source {
                path: "a.log".to_string(),
                format: Format::Text,
            }),
            columns: vec![ColumnRef::Index(1), ColumnRef::Index(3)],
        };
        let cmd = generate(&plan).expect("compile");
        assert!(cmd.contains(r#"print $1 " " $3"#), "command: {cmd}");
        assert!(!cmd.contains("-F"), "command: {cmd}");
    }

    #[test]
    fn test_contains_and_endswith_predicates() {
        let plan = PlanNode::Filter {
            child: Box::new(PlanNode::Filter {
                child: Box::new(csv_source("d.csv")),
                column: Some(named("host")),
                op: FilterOp::EndsWith,
                value: FilterValue::Str(".com".to_string()),
                case_sensitive: true,
            }),
            column: Some(named("msg")),
            op: FilterOp::Contains,
            value: FilterValue::Str("err".to_string()),
            case_sensitive: true,
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains(r#"substr($h["host"],length($h["host"])-length(".com")+1)==".com""#),
            "command: {cmd}"
        );
        assert!(cmd.contains(r#"index($h["msg"],"err")>0"#), "command: {cmd}");
    }

    #[test]
    fn test_regex_predicate_escapes_slashes() {
        let plan = PlanNode::Filter {
            child: Box::new(csv_source("d.csv")),
            column: Some(named("path")),
            op: FilterOp::Regex,
            value: FilterValue::Str("^/api/v[0-9]".to_string()),
            case_sensitive: true,
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains(r#"$h["path"]~/^\/api\/v[0-9]/"#),
            "command: {cmd}"
        );
    }

    #[test]
    fn test_case_insensitive_folds_both_sides() {
        let plan = PlanNode::Filter {
            child: Box::new(csv_source("d.csv")),
            column: Some(named("level")),
            op: FilterOp::Eq,
            value: FilterValue::Str("ERROR".to_string()),
            case_sensitive: false,
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains(r#"tolower($h["level"])=="error""#),
            "command: {cmd}"
        );
    }

    #[test]
    fn test_group_by_count_and_sum() {
        let plan = PlanNode::GroupBy {
            child: Box::new(PlanNode::Filter {
                child: Box::new(csv_source("sales.csv")),
                column: Some(named("quantity")),
                op: FilterOp::Gt,
                value: FilterValue::Int(0),
                case_sensitive: true,
            }),
            keys: vec![named("region")],
            aggregations: vec![
                Aggregation {
                    func: AggFunc::Count,
                    column: None,
                    alias: "total_orders".to_string(),
                },
                Aggregation {
                    func: AggFunc::Sum,
                    column: Some(named("quantity")),
                    alias: "total_quantity".to_string(),
                },
            ],
        };
        let cmd = generate(&plan).expect("compile");
        assert!(cmd.contains(r#"k=$h["region"]"#), "command: {cmd}");
        assert!(cmd.contains("count_total_orders[k]++"), "command: {cmd}");
        assert!(
            cmd.contains(r#"sum_total_quantity[k]+=$h["quantity"]"#),
            "command: {cmd}"
        );
        assert!(cmd.contains("_keys[k]=1"), "command: {cmd}");
        assert!(
            cmd.contains(r#"print k "," count_total_orders[k] "," sum_total_quantity[k]"#),
            "command: {cmd}"
        );
    }

    #[test]
    fn test_multi_key_group_by_uses_subsep() {
        let plan = PlanNode::GroupBy {
            child: Box::new(csv_source("sales.csv")),
            keys: vec![named("region"), named("product")],
            aggregations: vec![Aggregation {
                func: AggFunc::Count,
                column: None,
                alias: "orders".to_string(),
            }],
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains(r#"k=($h["region"] SUBSEP $h["product"])"#),
            "command: {cmd}"
        );
        assert!(cmd.contains("split(k,ks,SUBSEP)"), "command: {cmd}");
        assert!(
            cmd.contains(r#"print ks[1] "," ks[2] "," count_orders[k]"#),
            "command: {cmd}"
        );
    }

    #[test]
    fn test_avg_emits_ratio() {
        let plan = PlanNode::GroupBy {
            child: Box::new(csv_source("s.csv")),
            keys: vec![named("dept")],
            aggregations: vec![Aggregation {
                func: AggFunc::Avg,
                column: Some(named("salary")),
                alias: "average".to_string(),
            }],
        };
        let cmd = generate(&plan).expect("compile");
        assert!(
            cmd.contains(r#"avg_sum_average[k]+=$h["salary"]; avg_cnt_average[k]++"#),
            "command: {cmd}"
        );
        assert!(
            cmd.contains("avg_sum_average[k]/avg_cnt_average[k]"),
            "command: {cmd}"
        );
    }

    #[test]
    fn test_count_distinct_splits_on_subsep() {
        let plan = PlanNode::GroupBy {
            child: Box::new(csv_source("s.csv")),
            keys: vec![named("region")],
            aggregations: vec![Aggregation {
                func: AggFunc::CountDistinct,
                column: Some(named("ip")),
                alias: "unique_ips".to_string(),
            }],
        };
        let cmd = generate(&plan).expect("compile");
        assert!(cmd.contains(r#"cd_unique_ips[k,$h["ip"]]=1"#), "command: {cmd}");
        assert!(
            cmd.contains("substr(c,1,length(k)+1)==k SUBSEP"),
            "command: {cmd}"
        );
        assert!(cmd.contains("n_unique_ips++"), "command: {cmd}");
    }

    #[test]
    fn test_alias_sanitization() {
        assert_eq!(sanitize_name("total-orders"), "total_orders");
        assert_eq!(sanitize_name("p90 latency"), "p90_latency");
        assert_eq!(sanitize_name("plain_name"), "plain_name");
    }

    #[test]
    fn test_aggregation_without_column_is_rejected() {
        let plan = PlanNode::GroupBy {
            child: Box::new(csv_source("s.csv")),
            keys: vec![named("region")],
            aggregations: vec![Aggregation {
                func: AggFunc::Sum,
                column: None,
                alias: "broken".to_string(),
            }],
        };
        assert!(matches!(
            generate(&plan),
            Err(SparkError::Compile(_))
        ));
    }

}
