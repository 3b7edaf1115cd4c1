//! # Query Builder
//!
//! Builds the dynamic `SELECT` and `UPDATE` statements for posts.
//!
//! Every value, `LIMIT` and `OFFSET` included, is bound as a numbered
//! placeholder (`?1`, `?2`, ...). The only text spliced into the SQL is the
//! sort column, the sort direction and the `published` status literal, all of
//! which come from closed enums that were validated before a statement exists.

use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::models::{ListParams, PostId, PostPatch, PostStatus};

/// Largest page `listPublic` will serve.
pub const MAX_PAGE_SIZE: i64 = 50;

/// Columns of the public projection, in select order.
pub const PUBLIC_COLUMNS: &str =
    "id, title, create_date, interview_date, company, position, body, votes_up, votes_down, views";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreateDate,
    InterviewDate,
    Views,
}

impl SortKey {
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::CreateDate => "create_date",
            SortKey::InterviewDate => "interview_date",
            SortKey::Views => "views",
        }
    }
}

impl FromStr for SortKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "createDate" | "create_date" => Ok(SortKey::CreateDate),
            "interviewDate" | "interview_date" => Ok(SortKey::InterviewDate),
            "views" => Ok(SortKey::Views),
            _ => Err(AppError::invalid(
                "Please select required sortKey (createDate, interviewDate, or views)",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(AppError::invalid("Please select required sortOrder (asc or desc)")),
        }
    }
}

/// Equality filters, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub company: Option<String>,
    pub position: Option<String>,
}

/// A validated listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
    pub filter: PostFilter,
}

impl ListQuery {
    /// Checks that all four paging/sorting parameters are present and in domain.
    ///
    /// `offset = 0` is a real value; only an absent offset is rejected.
    pub fn from_params(params: ListParams) -> Result<Self> {
        let (Some(sort_key), Some(sort_order), Some(limit), Some(offset)) =
            (params.sort_key, params.sort_order, params.limit, params.offset)
        else {
            return Err(AppError::invalid(
                "Please enter required sortKey (createDate, interviewDate, or views), sortOrder (asc or desc), limit and an offset",
            ));
        };

        let sort_key = sort_key.parse::<SortKey>()?;
        let sort_order = sort_order.parse::<SortOrder>()?;

        if limit < 1 {
            return Err(AppError::invalid("Limit must be at least 1"));
        }
        if limit > MAX_PAGE_SIZE {
            return Err(AppError::invalid(format!("Maximum limit is {MAX_PAGE_SIZE}")));
        }
        if offset < 0 {
            return Err(AppError::invalid("Offset must not be negative"));
        }

        Ok(Self {
            sort_key,
            sort_order,
            limit,
            offset,
            filter: PostFilter {
                company: crate::models::non_empty(params.company),
                position: crate::models::non_empty(params.position),
            },
        })
    }
}

/// A value bound to a numbered placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Date(NaiveDate),
}

/// SQL text plus its positional parameters, `params[n - 1]` binding `?n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Default)]
struct Binds(Vec<SqlValue>);

impl Binds {
    /// Records the value and returns its placeholder.
    fn bind(&mut self, value: SqlValue) -> String {
        self.0.push(value);
        format!("?{}", self.0.len())
    }
}

/// `SELECT` of published posts, filtered, sorted and paged.
pub fn select_published(query: &ListQuery) -> Statement {
    let mut binds = Binds::default();
    let mut sql = format!(
        "SELECT {PUBLIC_COLUMNS} FROM posts WHERE status = '{}'",
        PostStatus::Published.as_str()
    );

    if let Some(company) = &query.filter.company {
        let p = binds.bind(SqlValue::Text(company.clone()));
        sql.push_str(&format!(" AND company = {p}"));
    }
    if let Some(position) = &query.filter.position {
        let p = binds.bind(SqlValue::Text(position.clone()));
        sql.push_str(&format!(" AND position = {p}"));
    }

    sql.push_str(&format!(
        " ORDER BY {} {}",
        query.sort_key.column(),
        query.sort_order.keyword()
    ));

    let limit = binds.bind(SqlValue::Int(query.limit));
    let offset = binds.bind(SqlValue::Int(query.offset));
    sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));

    Statement { sql, params: binds.0 }
}

/// `UPDATE` of the supplied columns, in the fixed order
/// title, company, position, body, interview_date.
///
/// Returns `None` when the patch carries nothing to write.
pub fn update_post(id: PostId, patch: &PostPatch) -> Option<Statement> {
    if patch.is_empty() {
        return None;
    }

    let mut binds = Binds::default();
    let mut assignments = Vec::new();

    let text_columns = [
        ("title", &patch.title),
        ("company", &patch.company),
        ("position", &patch.position),
        ("body", &patch.body),
    ];
    for (column, value) in text_columns {
        if let Some(value) = value {
            let p = binds.bind(SqlValue::Text(value.clone()));
            assignments.push(format!("{column} = {p}"));
        }
    }
    if let Some(date) = patch.interview_date {
        let p = binds.bind(SqlValue::Date(date));
        assignments.push(format!("interview_date = {p}"));
    }

    let id = binds.bind(SqlValue::Int(id));
    let sql = format!(
        "UPDATE posts SET {} WHERE id = {id} AND status = '{}'",
        assignments.join(", "),
        PostStatus::Published.as_str()
    );

    Some(Statement { sql, params: binds.0 })
}
