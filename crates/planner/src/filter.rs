//! The scan-pruning filter compiler: lowers an `Expr` to a
//! `Ternary` function over a `SparseIndex` and a block index.

use sneller_blockfmt::{Path, SparseIndex, Ternary, Value};
use sneller_common::Timestamp;

use crate::expr::{CastOp, CmpOp, Expr};

/// `compileFilter(expr) -> (fn, ok)`. `ok` is false only when the
/// expression tree itself is malformed in a way evaluation can't recover from;
/// every unsupported leaf shape still compiles, just to a function that always
/// answers `Maybe` — unknown paths or unsupported operators never return
/// `Never`/`Always`.
pub fn compile_filter(expr: Expr) -> (Box<dyn Fn(&SparseIndex, usize) -> Ternary + Send + Sync>, bool) {
    (Box::new(move |sparse, block| eval(&expr, sparse, block)), true)
}

fn eval(expr: &Expr, sparse: &SparseIndex, block: usize) -> Ternary {
    match expr {
        Expr::Bool(true) => Ternary::Always,
        Expr::Bool(false) => Ternary::Never,
        Expr::Const(_) | Expr::Path(_) => Ternary::Maybe,
        Expr::BinaryOp { op, left, right } => eval_cmp(*op, left, right, sparse, block),
        Expr::Between { expr, low, high } => eval_between(expr, low, high, sparse, block),
        Expr::UnaryCast { .. } => Ternary::Maybe,
        Expr::And(a, b) => eval(a, sparse, block).and(eval(b, sparse, block)),
        Expr::Or(a, b) => eval(a, sparse, block).or(eval(b, sparse, block)),
        Expr::Not(a) => eval(a, sparse, block).not(),
        Expr::Xor(a, b) => eval(a, sparse, block).xor(eval(b, sparse, block)),
    }
}

/// Resolves an operand to `(path, optional time-cast)` if it names one,
/// pushing a `UnaryCast` through to the underlying path so a timestamp
/// comparison on a cast expression still resolves against the sparse index.
fn as_path(expr: &Expr) -> Option<(&Path, Option<CastOp>)> {
    match expr {
        Expr::Path(p) => Some((p, None)),
        Expr::UnaryCast { op, expr } => match expr.as_ref() {
            Expr::Path(p) => Some((p, Some(*op))),
            _ => None,
        },
        _ => None,
    }
}

/// Resolves a constant operand to the integer domain `resolve_int_range`
/// compares against: a bare `Int` literal as-is, or a `Timestamp` literal
/// converted through the same `cast` applied to the path side, so e.g.
/// `TO_UNIX_EPOCH(t) < 10:00:00` compares both sides in whole seconds.
fn as_const_int(expr: &Expr, cast: Option<CastOp>) -> Option<i64> {
    match expr {
        Expr::Const(Value::Int(i)) => Some(*i),
        Expr::Const(Value::Timestamp(t)) => Some(match cast {
            Some(CastOp::ToUnixEpoch) => t.to_unix_epoch_seconds(),
            Some(CastOp::ToUnixMicro) | None => t.to_unix_micros(),
        }),
        _ => None,
    }
}

fn resolve_int_range(
    sparse: &SparseIndex,
    block: usize,
    path: &Path,
    cast: Option<CastOp>,
) -> Option<(i64, i64)> {
    let range = sparse.range(path, block)?;
    match (&range.min, &range.max) {
        (Value::Int(lo), Value::Int(hi)) if cast.is_none() => Some((*lo, *hi)),
        (Value::Timestamp(lo), Value::Timestamp(hi)) => {
            let convert = |t: &Timestamp| match cast {
                Some(CastOp::ToUnixEpoch) => t.to_unix_epoch_seconds(),
                Some(CastOp::ToUnixMicro) | None => t.to_unix_micros(),
            };
            Some((convert(lo), convert(hi)))
        }
        _ => None,
    }
}

fn mirror(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Le => CmpOp::Ge,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Ge => CmpOp::Le,
        CmpOp::Eq => CmpOp::Eq,
    }
}

fn eval_cmp(op: CmpOp, left: &Expr, right: &Expr, sparse: &SparseIndex, block: usize) -> Ternary {
    let (path_side, const_side, op) = if as_path(left).is_some() {
        (left, right, op)
    } else if as_path(right).is_some() {
        (right, left, mirror(op))
    } else {
        return Ternary::Maybe;
    };
    let (path, cast) = match as_path(path_side) {
        Some(v) => v,
        None => return Ternary::Maybe,
    };
    let Some(c) = as_const_int(const_side, cast) else {
        return Ternary::Maybe;
    };
    let Some((lo, hi)) = resolve_int_range(sparse, block, path, cast) else {
        return Ternary::Maybe;
    };
    match op {
        // `<`: `hi < const -> T; lo >= const -> F; else U`.
        CmpOp::Lt => {
            if hi < c {
                Ternary::Always
            } else if lo >= c {
                Ternary::Never
            } else {
                Ternary::Maybe
            }
        }
        CmpOp::Le => {
            if hi <= c {
                Ternary::Always
            } else if lo > c {
                Ternary::Never
            } else {
                Ternary::Maybe
            }
        }
        CmpOp::Gt => {
            if lo > c {
                Ternary::Always
            } else if hi <= c {
                Ternary::Never
            } else {
                Ternary::Maybe
            }
        }
        CmpOp::Ge => {
            if lo >= c {
                Ternary::Always
            } else if hi < c {
                Ternary::Never
            } else {
                Ternary::Maybe
            }
        }
        // `=`: "if lo <= const <= hi -> U, else F" (never Always: other values
        // in-range besides `const` may still not equal it).
        CmpOp::Eq => {
            if lo <= c && c <= hi {
                Ternary::Maybe
            } else {
                Ternary::Never
            }
        }
    }
}

fn eval_between(expr: &Expr, low: &Expr, high: &Expr, sparse: &SparseIndex, block: usize) -> Ternary {
    let Some((path, cast)) = as_path(expr) else {
        return Ternary::Maybe;
    };
    let (Some(a), Some(b)) = (as_const_int(low, cast), as_const_int(high, cast)) else {
        return Ternary::Maybe;
    };
    let Some((lo, hi)) = resolve_int_range(sparse, block, path, cast) else {
        return Ternary::Maybe;
    };
    let inter_lo = lo.max(a);
    let inter_hi = hi.min(b);
    if inter_lo > inter_hi {
        Ternary::Never
    } else if lo >= a && hi <= b {
        Ternary::Always
    } else {
        Ternary::Maybe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sneller_blockfmt::Range;

    fn sparse_with(path: &[&str], min: i64, max: i64) -> SparseIndex {
        let mut s = SparseIndex::new();
        s.push(vec![(
            path.iter().map(|x| x.to_string()).collect(),
            Range::new(Value::Int(min), Value::Int(max)),
        )]);
        s
    }

    #[test]
    fn const_bools_are_unconditional() {
        let sparse = SparseIndex::new();
        let (f, _) = compile_filter(Expr::Bool(false));
        assert_eq!(f(&sparse, 0), Ternary::Never);
        let (t, _) = compile_filter(Expr::Bool(true));
        assert_eq!(t(&sparse, 0), Ternary::Always);
    }

    #[test]
    fn free_path_is_maybe_on_empty_index() {
        let sparse = SparseIndex::new();
        let (f, _) = compile_filter(Expr::path(&["x"]));
        assert_eq!(f(&sparse, 0), Ternary::Maybe);
    }

    #[test]
    fn lt_leaf_rule() {
        let sparse = sparse_with(&["t"], 10, 20);
        let (f, _) = compile_filter(Expr::cmp(CmpOp::Lt, Expr::path(&["t"]), Expr::int(25)));
        assert_eq!(f(&sparse, 0), Ternary::Always);
        let (f, _) = compile_filter(Expr::cmp(CmpOp::Lt, Expr::path(&["t"]), Expr::int(5)));
        assert_eq!(f(&sparse, 0), Ternary::Never);
        let (f, _) = compile_filter(Expr::cmp(CmpOp::Lt, Expr::path(&["t"]), Expr::int(15)));
        assert_eq!(f(&sparse, 0), Ternary::Maybe);
    }

    #[test]
    fn between_inclusive_bounds_are_maybe() {
        let sparse = sparse_with(&["t"], 10, 20);
        let (f, _) = compile_filter(Expr::between(Expr::path(&["t"]), Expr::int(10), Expr::int(20)));
        assert_eq!(f(&sparse, 0), Ternary::Maybe);
        let (f, _) = compile_filter(Expr::between(Expr::path(&["t"]), Expr::int(0), Expr::int(5)));
        assert_eq!(f(&sparse, 0), Ternary::Never);
        let (f, _) = compile_filter(Expr::between(Expr::path(&["t"]), Expr::int(0), Expr::int(100)));
        assert_eq!(f(&sparse, 0), Ternary::Always);
    }

    #[test]
    fn timestamp_literal_between_prunes_blocks() {
        let ts = |us: i64| Value::Timestamp(sneller_common::Timestamp::from_micros(us));
        let mut sparse = SparseIndex::new();
        sparse.push(vec![(vec!["t".to_string()], Range::new(ts(0), ts(3_540_000_000)))]);
        sparse.push(vec![(vec!["t".to_string()], Range::new(ts(3_540_000_000), ts(3_660_000_000)))]);
        sparse.push(vec![(vec!["t".to_string()], Range::new(ts(3_660_000_000), ts(3_900_000_000)))]);

        let low = Expr::timestamp_micros(3_600_000_000);
        let high = Expr::timestamp_micros(3_720_000_000);
        let (f, _) = compile_filter(Expr::between(Expr::path(&["t"]), low, high));
        assert_eq!(f(&sparse, 0), Ternary::Never);
        assert_eq!(f(&sparse, 1), Ternary::Maybe);
        assert_eq!(f(&sparse, 2), Ternary::Maybe);
    }
}
