use agenthub_types::{SCORE_DELTA_MAX, SCORE_MAX, SCORE_MIN, ToolScore, ToolType, normalize_keyword};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::records::{parse_enum, parse_ts, ts};
use crate::Result;

/// Applies one feedback event to a (keyword, tool) score row. The delta is
/// clamped to the per-event range, the running score to the score range, and
/// the usage counters only ever grow.
pub fn feedback(
    conn: &Connection,
    keyword: &str,
    tool_name: &str,
    tool_type: ToolType,
    delta: f64,
    success: bool,
    now: DateTime<Utc>,
) -> Result<ToolScore> {
    let keyword = normalize_keyword(keyword);
    let delta = delta.clamp(-SCORE_DELTA_MAX, SCORE_DELTA_MAX);
    conn.execute(
        r#"
        INSERT INTO tool_scores (keyword, tool_name, tool_type, score, use_count, success_count, last_used_at)
        VALUES (?1, ?2, ?3, MAX(?6, MIN(?7, ?4)), 1, (CASE WHEN ?5 THEN 1 ELSE 0 END), ?8)
        ON CONFLICT(keyword, tool_name) DO UPDATE SET
            score = MAX(?6, MIN(?7, tool_scores.score + ?4)),
            use_count = tool_scores.use_count + 1,
            success_count = tool_scores.success_count + (CASE WHEN ?5 THEN 1 ELSE 0 END),
            tool_type = ?3,
            last_used_at = ?8
        "#,
        params![
            keyword,
            tool_name,
            tool_type.as_str(),
            delta,
            success,
            SCORE_MIN,
            SCORE_MAX,
            ts(now),
        ],
    )?;

    conn.query_row(
        &format!("{} WHERE keyword = ?1 AND tool_name = ?2", SELECT),
        params![keyword, tool_name],
        read_row,
    )
    .map_err(Into::into)
    .and_then(Row::into_score)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Suggestion {
    pub tool_name: String,
    pub tool_type: String,
    pub total_score: f64,
    pub matched_keywords: i64,
    pub use_count: i64,
    pub success_count: i64,
}

/// Ranks tools for a set of keywords: sum of scores across matched keywords,
/// best first. Optionally restricted to one tool kind.
pub fn suggest(
    conn: &Connection,
    keywords: &[String],
    tool_type: Option<ToolType>,
    limit: usize,
) -> Result<Vec<Suggestion>> {
    if keywords.is_empty() {
        return Ok(Vec::new());
    }

    let normalized: Vec<String> = keywords.iter().map(|k| normalize_keyword(k)).collect();
    let placeholders = vec!["?"; normalized.len()].join(", ");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = normalized
        .iter()
        .map(|k| Box::new(k.clone()) as Box<dyn rusqlite::ToSql>)
        .collect();

    let type_clause = match tool_type {
        Some(tt) => {
            params.push(Box::new(tt.as_str().to_string()));
            format!("AND tool_type = ?{}", params.len())
        }
        None => String::new(),
    };

    let query = format!(
        r#"
        SELECT tool_name, tool_type, SUM(score), COUNT(*), SUM(use_count), SUM(success_count)
        FROM tool_scores
        WHERE keyword IN ({}) {}
        GROUP BY tool_name, tool_type
        ORDER BY SUM(score) DESC
        LIMIT {}
        "#,
        placeholders, type_clause, limit
    );

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(Suggestion {
                tool_name: row.get(0)?,
                tool_type: row.get(1)?,
                total_score: row.get(2)?,
                matched_keywords: row.get(3)?,
                use_count: row.get(4)?,
                success_count: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutingStats {
    pub total_rows: i64,
    pub distinct_keywords: i64,
    pub distinct_tools: i64,
    pub top: Vec<ToolScore>,
}

pub fn stats(conn: &Connection, top_limit: usize) -> Result<RoutingStats> {
    let (total_rows, distinct_keywords, distinct_tools) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT keyword), COUNT(DISTINCT tool_name) FROM tool_scores",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut stmt = conn.prepare(&format!(
        "{} ORDER BY score DESC LIMIT {}",
        SELECT, top_limit
    ))?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    let top = rows
        .into_iter()
        .map(Row::into_score)
        .collect::<Result<Vec<_>>>()?;

    Ok(RoutingStats {
        total_rows,
        distinct_keywords,
        distinct_tools,
        top,
    })
}

const SELECT: &str = r#"
    SELECT keyword, tool_name, tool_type, score, use_count, success_count, last_used_at
    FROM tool_scores
"#;

struct Row {
    keyword: String,
    tool_name: String,
    tool_type: String,
    score: f64,
    use_count: i64,
    success_count: i64,
    last_used_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
    Ok(Row {
        keyword: row.get(0)?,
        tool_name: row.get(1)?,
        tool_type: row.get(2)?,
        score: row.get(3)?,
        use_count: row.get(4)?,
        success_count: row.get(5)?,
        last_used_at: row.get(6)?,
    })
}

impl Row {
    fn into_score(self) -> Result<ToolScore> {
        Ok(ToolScore {
            keyword: self.keyword,
            tool_name: self.tool_name,
            tool_type: parse_enum(&self.tool_type)?,
            score: self.score,
            use_count: self.use_count,
            success_count: self.success_count,
            last_used_at: parse_ts(&self.last_used_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn feedback_upserts_and_accumulates() {
        let conn = setup();
        let first = feedback(&conn, "OAuth", "Edit", ToolType::Builtin, 1.5, true, Utc::now()).unwrap();
        assert_eq!(first.keyword, "oauth");
        assert_eq!(first.use_count, 1);

        let second = feedback(&conn, "oauth", "Edit", ToolType::Builtin, 2.0, false, Utc::now()).unwrap();
        assert_eq!(second.use_count, 2);
        assert_eq!(second.success_count, 1);
        assert!((second.score - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn score_and_delta_are_clamped() {
        let conn = setup();
        // delta clamps to +5 per event, score to +10 overall
        for _ in 0..5 {
            feedback(&conn, "k", "Tool", ToolType::Agent, 100.0, true, Utc::now()).unwrap();
        }
        let score = feedback(&conn, "k", "Tool", ToolType::Agent, 100.0, true, Utc::now()).unwrap();
        assert_eq!(score.score, SCORE_MAX);

        for _ in 0..10 {
            feedback(&conn, "k", "Tool", ToolType::Agent, -100.0, false, Utc::now()).unwrap();
        }
        let floor = feedback(&conn, "k", "Tool", ToolType::Agent, -100.0, false, Utc::now()).unwrap();
        assert_eq!(floor.score, SCORE_MIN);
    }

    #[test]
    fn suggest_ranks_by_total_score() {
        let conn = setup();
        feedback(&conn, "auth", "oauth-skill", ToolType::Skill, 4.0, true, Utc::now()).unwrap();
        feedback(&conn, "token", "oauth-skill", ToolType::Skill, 3.0, true, Utc::now()).unwrap();
        feedback(&conn, "auth", "grep", ToolType::Builtin, 1.0, true, Utc::now()).unwrap();

        let ranked = suggest(
            &conn,
            &["auth".to_string(), "token".to_string()],
            None,
            10,
        )
        .unwrap();
        assert_eq!(ranked[0].tool_name, "oauth-skill");
        assert_eq!(ranked[0].matched_keywords, 2);
        assert_eq!(ranked.len(), 2);

        let only_builtin = suggest(
            &conn,
            &["auth".to_string()],
            Some(ToolType::Builtin),
            10,
        )
        .unwrap();
        assert_eq!(only_builtin.len(), 1);
        assert_eq!(only_builtin[0].tool_name, "grep");
    }
}
