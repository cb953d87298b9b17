use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom {
        id: Ulid,
        capacity: u32,
    },
    InsertBooking {
        id: Ulid,
        room_id: Ulid,
        start: Ms,
        end: Ms,
    },
    /// `DELETE FROM bookings WHERE room_id = '...'` clears every booking on
    /// the room and resets it to FREE.
    FreeRoom {
        room_id: Ulid,
    },
    LockRoom {
        room_id: Ulid,
    },
    UnlockRoom {
        room_id: Ulid,
    },
    SelectRooms {
        id: Option<Ulid>,
    },
    SelectBookings {
        room_id: Ulid,
    },
    SelectAvailability {
        room_id: Ulid,
        start: Ms,
        end: Ms,
    },
    Listen {
        channel: String,
    },
    /// `UNLISTEN <channel>` or `UNLISTEN *` (None).
    Unlisten {
        channel: Option<String>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }
    if trimmed.to_uppercase().starts_with("UNLISTEN") {
        let rest = trimmed[8..].trim().trim_matches(';');
        let channel = if rest.is_empty() || rest == "*" {
            None
        } else {
            Some(rest.to_string())
        };
        return Ok(Command::Unlisten { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "rooms" => {
            if values.is_empty() {
                return Err(SqlError::WrongArity("rooms", 1, 0));
            }
            let id = parse_ulid(&values[0])?;
            let capacity = if values.len() >= 2 {
                parse_u32(&values[1])?
            } else {
                1
            };
            Ok(Command::InsertRoom { id, capacity })
        }
        "bookings" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("bookings", 4, values.len()));
            }
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                room_id: parse_ulid(&values[1])?,
                start: parse_i64(&values[2])?,
                end: parse_i64(&values[3])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    let room_id = extract_where_eq(&delete.selection, "room_id")?;
    Ok(Command::FreeRoom { room_id })
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "rooms" {
        return Err(SqlError::UnknownTable(name));
    }
    if assignments.len() != 1 {
        return Err(SqlError::Unsupported("multi-column UPDATE".into()));
    }
    let assignment = &assignments[0];
    if assignment_column(&assignment.target).as_deref() != Some("status") {
        return Err(SqlError::Unsupported("only status can be updated".into()));
    }
    let room_id = extract_where_eq(selection, "id")?;

    let status = match extract_value(&assignment.value) {
        Some(Value::SingleQuotedString(s)) => s.to_uppercase(),
        _ => return Err(SqlError::Parse("status must be a string".into())),
    };
    match status.as_str() {
        "LOCKED" => Ok(Command::LockRoom { room_id }),
        "FREE" => Ok(Command::UnlockRoom { room_id }),
        other => Err(SqlError::Parse(format!("cannot set status to {other}"))),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "rooms" => {
            let id = match &select.selection {
                Some(sel) => Some(extract_eq_from(sel, "id")?),
                None => None,
            };
            Ok(Command::SelectRooms { id })
        }
        "bookings" => {
            let room_id = extract_where_eq(&select.selection, "room_id")?;
            Ok(Command::SelectBookings { room_id })
        }
        "availability" => {
            let (mut room_id, mut start, mut end) = (None, None, None);
            if let Some(selection) = &select.selection {
                extract_availability_filters(selection, &mut room_id, &mut start, &mut end)?;
            }
            Ok(Command::SelectAvailability {
                room_id: room_id.ok_or(SqlError::MissingFilter("room_id"))?,
                start: start.ok_or(SqlError::MissingFilter("start"))?,
                end: end.ok_or(SqlError::MissingFilter("end"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_availability_filters(
    expr: &Expr,
    room_id: &mut Option<Ulid>,
    start: &mut Option<Ms>,
    end: &mut Option<Ms>,
) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_availability_filters(left, room_id, start, end)?;
                extract_availability_filters(right, room_id, start, end)?;
            }
            ast::BinaryOperator::Eq => {
                if expr_column_name(left).as_deref() == Some("room_id") {
                    *room_id = Some(parse_ulid_expr(right)?);
                }
            }
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("start") {
                    *start = Some(parse_i64_expr(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("end") {
                    *end = Some(parse_i64_expr(right)?);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(target: &ast::AssignmentTarget) -> Option<String> {
    match target {
        ast::AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            if values.rows.len() > 1 {
                return Err(SqlError::Unsupported("multi-row INSERT".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_eq(selection: &Option<Expr>, column: &'static str) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter(column))?;
    extract_eq_from(sel, column)
}

fn extract_eq_from(sel: &Expr, column: &'static str) -> Result<Ulid, SqlError> {
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some(column) {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter(column))
            }
        }
        _ => Err(SqlError::MissingFilter(column)),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    parse_ulid_expr(expr)
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    parse_i64_expr(expr)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const RID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_room() {
        let sql = format!("INSERT INTO rooms (id, capacity) VALUES ('{RID}', 12)");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertRoom { id, capacity } => {
                assert_eq!(id.to_string(), RID);
                assert_eq!(capacity, 12);
            }
            _ => panic!("expected InsertRoom, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_room_default_capacity() {
        let sql = format!("INSERT INTO rooms (id) VALUES ('{RID}')");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::InsertRoom { capacity: 1, .. }));
    }

    #[test]
    fn parse_insert_booking() {
        let sql = format!(
            r#"INSERT INTO bookings (id, room_id, start, "end") VALUES ('{RID}', '{RID}', 1000, 2000)"#
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBooking { start, end, .. } => {
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
            }
            _ => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_wrong_arity() {
        let sql = format!("INSERT INTO bookings (id, room_id) VALUES ('{RID}', '{RID}')");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::WrongArity("bookings", 4, 2))
        ));
    }

    #[test]
    fn parse_free_room() {
        let sql = format!("DELETE FROM bookings WHERE room_id = '{RID}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::FreeRoom { room_id } => assert_eq!(room_id.to_string(), RID),
            _ => panic!("expected FreeRoom, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_lock_room() {
        let sql = format!("UPDATE rooms SET status = 'LOCKED' WHERE id = '{RID}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::LockRoom { room_id } => assert_eq!(room_id.to_string(), RID),
            _ => panic!("expected LockRoom, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unlock_room() {
        let sql = format!("UPDATE rooms SET status = 'free' WHERE id = '{RID}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::UnlockRoom { .. }));
    }

    #[test]
    fn parse_update_to_booked_rejected() {
        // BOOKED is derived from bookings, never set directly
        let sql = format!("UPDATE rooms SET status = 'BOOKED' WHERE id = '{RID}'");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_update_other_column_rejected() {
        let sql = format!("UPDATE rooms SET capacity = 5 WHERE id = '{RID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_all_rooms() {
        let cmd = parse_sql("SELECT * FROM rooms").unwrap();
        assert_eq!(cmd, Command::SelectRooms { id: None });
    }

    #[test]
    fn parse_select_one_room() {
        let sql = format!("SELECT * FROM rooms WHERE id = '{RID}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectRooms { id: Some(id) } => assert_eq!(id.to_string(), RID),
            _ => panic!("expected SelectRooms, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_bookings() {
        let sql = format!("SELECT * FROM bookings WHERE room_id = '{RID}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::SelectBookings { .. }));
    }

    #[test]
    fn parse_select_bookings_requires_room_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM bookings"),
            Err(SqlError::MissingFilter("room_id"))
        ));
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            "SELECT * FROM availability WHERE room_id = '{RID}' AND start >= 1000 AND \"end\" <= 2000"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAvailability { room_id, start, end } => {
                assert_eq!(room_id.to_string(), RID);
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
            }
            _ => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_availability_missing_filter() {
        let sql = format!("SELECT * FROM availability WHERE room_id = '{RID}' AND start >= 1000");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter("end"))
        ));
    }

    #[test]
    fn parse_listen() {
        let sql = format!("LISTEN room_{RID}");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::Listen { channel } => assert_eq!(channel, format!("room_{RID}")),
            _ => panic!("expected Listen, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unlisten() {
        let cmd = parse_sql(&format!("UNLISTEN room_{RID}")).unwrap();
        assert_eq!(
            cmd,
            Command::Unlisten {
                channel: Some(format!("room_{RID}"))
            }
        );
        assert_eq!(
            parse_sql("UNLISTEN *").unwrap(),
            Command::Unlisten { channel: None }
        );
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{RID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_multi_row_insert_rejected() {
        let sql = format!("INSERT INTO rooms (id) VALUES ('{RID}'), ('{RID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_bad_ulid_errors() {
        let sql = "INSERT INTO rooms (id) VALUES ('not-a-ulid')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
