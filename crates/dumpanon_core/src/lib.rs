// dumpanon_core: pure Rust library for anonymizing SQL dump rows: literal codec, tuple tokenizer and column transforms.
pub mod anonymizer;
pub mod classify;
pub mod error;
pub mod literal;
pub mod row;
pub mod schema;
pub mod tokenizer;
pub mod value;

pub use anonymizer::{
    anonymizer_from_json, anonymizer_from_path, transform_fn, AnonConfig, AnonymizerCore, Applied, FieldRule,
    FnTransform, HashKind, HashTransform, JsonPath, JsonPaths, Mode, Quoting, TableAction, TableRule, Transform,
};
pub use classify::{LengthClass, ThresholdPolicy, SHA256_DIGEST_SIZE};
pub use error::{
    ConfigError, MalformedLiteral, MalformedRow, RowTransformError, SchemaError, StatementError, TransformError,
    TransformExecutionError,
};
pub use literal::{decode, encode, escape, unescape, Decoded, LiteralKind};
pub use schema::{cached_schema, ensure_schema_loaded, load_schema, LoadedSchema, SCHEMA_CACHE};
pub use tokenizer::{is_insert_statement, split_tuple, split_values, statement_table};
pub use value::{ColumnId, Value};

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
      "version": 1,
      "secret": "lapin",
      "tables": {
        "users": {
          "name": { "mode": "texthash" },
          "email": { "mode": "emailhash", "domain": "example.com" },
          "prefs": { "mode": "lines", "marker": "s_paypal_email", "fixed": "nobody@example.com" }
        }
      }
    }"#;

    fn users() -> LoadedSchema {
        LoadedSchema::from_json("mem", r#"{ "tables": { "users": ["id", "name", "email", "prefs", "created"] } }"#)
            .unwrap()
    }

    #[test]
    fn test_dump_line_end_to_end() {
        let anon = anonymizer_from_json(CONFIG).unwrap();
        let line = b"INSERT INTO `users` VALUES (1,'Alice','alice@corp.io','lang: fr\\ns_paypal_email: alice@pay.io\\ntheme: dark','2020-01-01'),(2,NULL,'','',NULL);\n";
        let out = anon.transform_statement_with_schema(line, &users()).unwrap();

        let list = split_values(&out).unwrap().unwrap();
        assert_eq!(list.tuples.len(), 2);
        let first = &out[list.tuples[0].clone()];
        let spans = split_tuple(first).unwrap();
        let field = |i: usize| decode(&first[spans[i].clone()]).unwrap();

        assert_eq!(field(0).value, Value::from("1"));
        assert_eq!(field(1).value.len(), 5);
        assert_ne!(field(1).value, Value::from("Alice"));
        assert!(field(2).value.as_str().unwrap().ends_with("@example.com"));
        assert_eq!(
            field(3).value.as_str().unwrap(),
            "lang: fr\ns_paypal_email: nobody@example.com\ntheme: dark"
        );
        assert_eq!(&first[spans[4].clone()], b"'2020-01-01'");

        let second = &out[list.tuples[1].clone()];
        assert_eq!(second, b"(2,NULL,'','',NULL)");
        assert!(out.ends_with(b");\n"));
    }

    #[test]
    fn test_same_input_same_output_across_instances() {
        let a = anonymizer_from_json(CONFIG).unwrap();
        let b = anonymizer_from_json(CONFIG).unwrap();
        let line = b"INSERT INTO `users` VALUES (9,'a very long display name that exceeds the threshold','x@y.z','',NULL);";
        let schema = users();
        assert_eq!(
            a.transform_statement_with_schema(line, &schema).unwrap(),
            b.transform_statement_with_schema(line, &schema).unwrap()
        );
    }

    #[test]
    fn test_json_column_and_truncated_table() {
        let anon = anonymizer_from_json(
            r#"{
              "secret": "lapin",
              "tables": {
                "sessions": "truncate",
                "accounts": {
                  "meta": { "mode": "json", "paths": { "paypal.email": { "mode": "emailhash", "domain": "example.com" } } }
                }
              }
            }"#,
        )
        .unwrap();
        let schema =
            LoadedSchema::from_json("mem", r#"{ "tables": { "accounts": ["id", "meta"], "sessions": ["id", "token"] } }"#)
                .unwrap();

        let line = br#"INSERT INTO `accounts` VALUES (1,'{\"paypal\":{\"email\":\"a@pay.io\"},\"lang\":\"fr\"}');"#;
        let out = anon.transform_statement_with_schema(line, &schema).unwrap();
        let list = split_values(&out).unwrap().unwrap();
        let tuple = &out[list.tuples[0].clone()];
        let spans = split_tuple(tuple).unwrap();
        let meta = decode(&tuple[spans[1].clone()]).unwrap().value;
        let doc: serde_json::Value = serde_json::from_slice(meta.as_bytes()).unwrap();
        assert!(doc["paypal"]["email"].as_str().unwrap().ends_with("@example.com"));
        assert_eq!(doc["lang"], "fr");

        let sessions = b"INSERT INTO `sessions` VALUES (1,'t0k3n');\n";
        assert!(anon.transform_statement_with_schema(sessions, &schema).unwrap().is_empty());
    }
}
