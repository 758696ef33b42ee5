//! A small predicate language for matching transactions against configured filters.
//!
//! Routing rules and settlement strategies both reduce to "does this transaction's field set satisfy these
//! conditions". Conditions compare a named field against an operand; predicates combine conditions with
//! `all`/`any`. A condition on a field the subject does not carry evaluates to false, whatever the operator.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Num(Decimal),
    Str(String),
    List(Vec<Operand>),
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Str(s.to_string())
    }
}

impl From<Decimal> for Operand {
    fn from(d: Decimal) -> Self {
        Operand::Num(d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Neq,
    In,
    Nin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub operand: Operand,
}

impl Condition {
    pub fn new<O: Into<Operand>>(field: &str, op: Op, operand: O) -> Self {
        Self { field: field.to_string(), op, operand: operand.into() }
    }

    pub fn matches(&self, fields: &HashMap<String, Operand>) -> bool {
        let Some(value) = fields.get(&self.field) else {
            return false;
        };
        match self.op {
            Op::Eq => value == &self.operand,
            Op::Neq => value != &self.operand,
            Op::Lt => Self::cmp_num(value, &self.operand, |o| o == std::cmp::Ordering::Less),
            Op::Le => Self::cmp_num(value, &self.operand, |o| o != std::cmp::Ordering::Greater),
            Op::Gt => Self::cmp_num(value, &self.operand, |o| o == std::cmp::Ordering::Greater),
            Op::Ge => Self::cmp_num(value, &self.operand, |o| o != std::cmp::Ordering::Less),
            Op::In => Self::in_list(value, &self.operand),
            Op::Nin => match &self.operand {
                Operand::List(_) => !Self::in_list(value, &self.operand),
                _ => false,
            },
        }
    }

    fn cmp_num(value: &Operand, operand: &Operand, check: impl Fn(std::cmp::Ordering) -> bool) -> bool {
        match (value, operand) {
            (Operand::Num(a), Operand::Num(b)) => check(a.cmp(b)),
            _ => false,
        }
    }

    fn in_list(value: &Operand, operand: &Operand) -> bool {
        match operand {
            Operand::List(items) => items.contains(value),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Cond(Condition),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, fields: &HashMap<String, Operand>) -> bool {
        match self {
            Predicate::Cond(c) => c.matches(fields),
            Predicate::All(ps) => ps.iter().all(|p| p.matches(fields)),
            Predicate::Any(ps) => ps.iter().any(|p| p.matches(fields)),
        }
    }
}
