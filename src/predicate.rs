use std::fmt;

/// A decoded row of the contigs table, the only table predicates run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigRecord {
    pub cid: String,
    pub bid: i32,
    pub length: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply<T: PartialOrd>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Row filter over the contigs table.
///
/// A small typed AST instead of a runtime-compiled expression string, with
/// "every row" as the explicit `All` rather than a sentinel comparison.
/// `Display` renders the equivalent expression so selections can be logged
/// for audit.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    Cid(CmpOp, String),
    Bid(CmpOp, i32),
    Length(CmpOp, i32),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn matches(&self, row: &ContigRecord) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Cid(op, value) => op.apply(&row.cid, value),
            Predicate::Bid(op, value) => op.apply(&row.bid, value),
            Predicate::Length(op, value) => op.apply(&row.length, value),
            Predicate::And(a, b) => a.matches(row) && b.matches(row),
            Predicate::Or(a, b) => a.matches(row) || b.matches(row),
        }
    }

    /// `(bid == a) | (bid == b) | ...`; an empty list matches nothing.
    pub fn any_bid(bids: &[i32]) -> Predicate {
        let mut iter = bids.iter();
        let first = match iter.next() {
            Some(&bid) => Predicate::Bid(CmpOp::Eq, bid),
            None => return Predicate::Bid(CmpOp::Lt, i32::MIN),
        };
        iter.fold(first, |acc, &bid| {
            Predicate::Or(Box::new(acc), Box::new(Predicate::Bid(CmpOp::Eq, bid)))
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::All => write!(f, "*"),
            Predicate::Cid(op, value) => write!(f, "(cid {} {:?})", op.symbol(), value),
            Predicate::Bid(op, value) => write!(f, "(bid {} {})", op.symbol(), value),
            Predicate::Length(op, value) => write!(f, "(length {} {})", op.symbol(), value),
            Predicate::And(a, b) => write!(f, "({a} & {b})"),
            Predicate::Or(a, b) => write!(f, "({a} | {b})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cid: &str, bid: i32, length: i32) -> ContigRecord {
        ContigRecord {
            cid: cid.into(),
            bid,
            length,
        }
    }

    #[test]
    fn all_matches_everything() {
        assert!(Predicate::All.matches(&row("", 0, 0)));
        assert!(Predicate::All.matches(&row("c1", 7, 1000)));
    }

    #[test]
    fn field_comparisons() {
        let r = row("c2", 3, 150);
        assert!(Predicate::Cid(CmpOp::Eq, "c2".into()).matches(&r));
        assert!(Predicate::Cid(CmpOp::Gt, "c1".into()).matches(&r));
        assert!(Predicate::Bid(CmpOp::Ne, 0).matches(&r));
        assert!(Predicate::Length(CmpOp::Ge, 150).matches(&r));
        assert!(!Predicate::Length(CmpOp::Lt, 150).matches(&r));
    }

    #[test]
    fn boolean_combinators() {
        let r = row("c1", 2, 500);
        let p = Predicate::And(
            Box::new(Predicate::Bid(CmpOp::Eq, 2)),
            Box::new(Predicate::Length(CmpOp::Gt, 100)),
        );
        assert!(p.matches(&r));
        let q = Predicate::Or(
            Box::new(Predicate::Bid(CmpOp::Eq, 9)),
            Box::new(Predicate::Cid(CmpOp::Eq, "c1".into())),
        );
        assert!(q.matches(&r));
    }

    #[test]
    fn any_bid_builder() {
        let p = Predicate::any_bid(&[2, 4]);
        assert!(p.matches(&row("x", 2, 1)));
        assert!(p.matches(&row("x", 4, 1)));
        assert!(!p.matches(&row("x", 3, 1)));
        assert!(!Predicate::any_bid(&[]).matches(&row("x", 0, 1)));
    }

    #[test]
    fn renders_for_audit() {
        let p = Predicate::Or(
            Box::new(Predicate::Bid(CmpOp::Eq, 4)),
            Box::new(Predicate::Length(CmpOp::Ge, 2500)),
        );
        assert_eq!(p.to_string(), "((bid == 4) | (length >= 2500))");
        assert_eq!(Predicate::All.to_string(), "*");
    }
}
