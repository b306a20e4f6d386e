//! Common table expressions (`WITH` clauses).

use super::query::QueryNode;
use super::raw::RawFragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialization {
    Default,
    Materialized,
    NotMaterialized,
}

#[derive(Debug, Clone)]
pub enum CteBody {
    Query(Box<QueryNode>),
    Raw(RawFragment),
}

#[derive(Debug, Clone)]
pub struct Cte {
    pub alias: String,
    pub columns: Option<Vec<String>>,
    pub body: CteBody,
    pub recursive: bool,
    pub materialization: Materialization,
}

impl Cte {
    pub fn new(alias: impl Into<String>, body: CteBody) -> Self {
        Cte {
            alias: alias.into(),
            columns: None,
            body,
            recursive: false,
            materialization: Materialization::Default,
        }
    }
}
