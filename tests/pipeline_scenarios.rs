//! End-to-end conversions through the standard pipeline.

use pgport::prelude::*;
use pretty_assertions::assert_eq;

fn convert(source: &str) -> (String, Conversion) {
    let mut tree = notation::parse(source).unwrap();
    let conversion = pgport::convert(&mut tree).unwrap();
    (compact(&tree, tree.root()), conversion)
}

#[test]
fn test_top_becomes_limit() {
    let (sql, conversion) = convert(
        r#"(Root (Statement
            (Clause (OtherKeyword "select") (WhiteSpace " ") (OtherKeyword "top") (WhiteSpace " ")
                (NumberValue "5") (WhiteSpace " ") (Asterisk "*") (WhiteSpace "\n"))
            (Clause (OtherKeyword "from") (WhiteSpace " ") (SelectionTarget (OtherNode "Orders")) (Semicolon ";"))))"#,
    );
    assert_eq!(sql, "select * from orders limit 5;");
    assert_eq!(conversion.warnings, 0);
}

#[test]
fn test_exec_becomes_call_with_named_arguments() {
    let (sql, _) = convert(
        r#"(Root (Statement (Clause
            (OtherKeyword "exec") (WhiteSpace " ") (OtherNode "dbo") (Period ".") (OtherNode "AddUser")
            (WhiteSpace " ") (OtherNode "@Name") (WhiteSpace " ") (EqualsSign "=") (WhiteSpace " ") (String "bob")
            (Comma ",") (WhiteSpace " ") (OtherNode "@Id") (WhiteSpace " ") (EqualsSign "=") (WhiteSpace " ")
            (OtherNode "@NewId") (WhiteSpace " ") (OtherKeyword "output") (Semicolon ";"))))"#,
    );
    assert_eq!(sql, "call dbo.add_user(_name => 'bob', _id => _new_id);");
}

#[test]
fn test_if_else_becomes_if_then_end_if() {
    let (sql, _) = convert(
        r#"(Root (Statement (Clause (IfStatement
            (ContainerOpen (OtherKeyword "if"))
            (BooleanExpression (OtherNode "@x") (OtherOperator ">") (NumberValue "0"))
            (ContainerSingleStatement (Statement (Clause (OtherKeyword "set") (WhiteSpace " ")
                (OtherNode "@y") (EqualsSign "=") (NumberValue "1") (Semicolon ";"))))
            (ElseClause
                (ContainerOpen (OtherKeyword "else"))
                (ContainerSingleStatement (Statement (Clause (OtherKeyword "set") (WhiteSpace " ")
                    (OtherNode "@y") (EqualsSign "=") (NumberValue "2") (Semicolon ";")))))))))"#,
    );
    assert_eq!(sql, "if _x > 0 then _y := 1; else _y := 2; end if;");
}

#[test]
fn test_if_else_with_begin_end_branches() {
    let (sql, _) = convert(
        r#"(Root (Statement (Clause (IfStatement
            (ContainerOpen (OtherKeyword "if"))
            (BooleanExpression (OtherNode "@x") (OtherOperator ">") (NumberValue "0"))
            (ContainerSingleStatement (Statement (Clause (BeginEndBlock
                (ContainerOpen (OtherKeyword "begin"))
                (ContainerMultiStatement (Statement (Clause (OtherKeyword "set") (WhiteSpace " ")
                    (OtherNode "@y") (EqualsSign "=") (NumberValue "1") (Semicolon ";"))))
                (ContainerClose (OtherKeyword "end"))))))
            (ElseClause
                (ContainerOpen (OtherKeyword "else"))
                (ContainerSingleStatement (Statement (Clause (BeginEndBlock
                    (ContainerOpen (OtherKeyword "begin"))
                    (ContainerMultiStatement (Statement (Clause (OtherKeyword "set") (WhiteSpace " ")
                        (OtherNode "@y") (EqualsSign "=") (NumberValue "2") (Semicolon ";"))))
                    (ContainerClose (OtherKeyword "end")))))))))))"#,
    );
    assert_eq!(sql, "if _x > 0 then _y := 1; else _y := 2; end if;");
}

#[test]
fn test_dateadd_of_getdate() {
    let (sql, _) = convert(
        r#"(Root (Statement (Clause (OtherKeyword "select") (WhiteSpace " ")
            (FunctionKeyword "dateadd")
            (FunctionParens (OtherNode "day") (Comma ",") (WhiteSpace " ") (NumberValue "1") (Comma ",")
                (WhiteSpace " ") (FunctionKeyword "getdate") (FunctionParens)))))"#,
    );
    assert_eq!(sql, "select (now() + interval '1 day');");
}

#[test]
fn test_procedure_declarations_are_consolidated() {
    let (sql, _) = convert(
        r#"(Root (Statement (Clause (DdlProceduralBlock
            (OtherKeyword "create") (WhiteSpace " ") (OtherKeyword "procedure") (WhiteSpace " ") (OtherNode "p")
            (WhiteSpace "\n")
            (DdlAsBlock
                (ContainerOpen (OtherKeyword "as"))
                (ContainerGeneralContent
                    (Statement (Clause (DdlDeclareBlock
                        (OtherKeyword "declare") (WhiteSpace " ") (OtherNode "@x") (WhiteSpace " ")
                        (DataTypeKeyword "int") (WhiteSpace " ") (EqualsSign "=") (WhiteSpace " ")
                        (NumberValue "5") (Comma ",") (WhiteSpace " ")
                        (OtherNode "@y") (WhiteSpace " ") (DataTypeKeyword "int") (WhiteSpace " ")
                        (CommentMultiLine " unused ")) (Semicolon ";")))
                    (Statement (Clause (OtherKeyword "set") (WhiteSpace " ") (OtherNode "@y") (WhiteSpace " ")
                        (EqualsSign "=") (WhiteSpace " ") (OtherNode "@x") (Semicolon ";")))))))))"#,
    );
    assert_eq!(
        sql,
        "create procedure p() language 'plpgsql' as $$ \
         declare _x int; _y int; /* unused */ \
         begin _x := 5; _y := _x; end; $$;"
    );
}

#[test]
fn test_insert_exec_into_unknown_table_warns() {
    let (sql, conversion) = convert(
        r#"(Root (Statement
            (Clause (CompoundKeyword (OtherKeyword "insert") (WhiteSpace " ") (OtherKeyword "into"))
                (WhiteSpace " ") (OtherNode "Results") (WhiteSpace " "))
            (Clause (OtherKeyword "exec") (WhiteSpace " ") (OtherNode "GetRows") (Semicolon ";"))))"#,
    );
    assert!(sql.starts_with("call get_rows(); insert into results select * from"));
    assert!(sql.contains("fetch_all_from('getrows_select1') as"));
    assert!(sql.contains("converter warning: (TODO)"));
    assert_eq!(conversion.warnings, 1);
}

#[test]
fn test_result_cursor_name_ignores_call_site_case() {
    let (sql, _) = convert(
        r#"(Root
            (Statement (Clause (DdlProceduralBlock
                (OtherKeyword "create") (WhiteSpace " ") (OtherKeyword "procedure") (WhiteSpace " ")
                (OtherNode "GetUsers") (WhiteSpace "\n")
                (DdlAsBlock
                    (ContainerOpen (OtherKeyword "as"))
                    (ContainerGeneralContent
                        (Statement (Clause (OtherKeyword "select") (WhiteSpace " ") (Asterisk "*"))
                            (Clause (OtherKeyword "from") (WhiteSpace " ") (SelectionTarget (OtherNode "users"))
                                (Semicolon ";"))))))))
            (Statement
                (Clause (CompoundKeyword (OtherKeyword "insert") (WhiteSpace " ") (OtherKeyword "into"))
                    (WhiteSpace " ") (OtherNode "Results") (WhiteSpace " "))
                (Clause (OtherKeyword "exec") (WhiteSpace " ") (OtherNode "getusers") (Semicolon ";"))))"#,
    );
    assert!(sql.contains("open _select1 for select * from users;"));
    assert_eq!(sql.matches("'getusers_select1'").count(), 2);
    assert!(!sql.contains("GetUsers_select1"));
}

#[test]
fn test_json_input() {
    let mut tree = repr::from_json(
        r#"{"tag": "Root", "children": [
            {"tag": "Statement", "children": [
                {"tag": "Clause", "children": [
                    {"tag": "OtherKeyword", "text": "select"},
                    {"tag": "FunctionKeyword", "text": "len"},
                    {"tag": "FunctionParens", "children": [{"tag": "NString", "text": "abc"}]}
                ]}
            ]}
        ]}"#,
    )
    .unwrap();
    pgport::convert(&mut tree).unwrap();
    assert_eq!(compact(&tree, tree.root()), "select length('abc');");
}

#[test]
fn test_malformed_input_names_the_pass() {
    let mut tree = notation::parse(
        r#"(Root (Statement (Clause (OtherKeyword "select")
            (FunctionKeyword "dateadd") (FunctionParens (OtherNode "day") (Comma ",") (NumberValue "1")))))"#,
    )
    .unwrap();
    let err = pgport::convert(&mut tree).unwrap_err();
    assert!(matches!(err, ConvertError::Pass { pass: "dateadd", .. }));
    assert!(err.to_string().contains("dateadd"));
}
