#[cfg(feature = "serde")]
mod serde_tests {
    use sqlate::{
        BindParameter, Context, EngineConfig, PlaceholderStyle, SqlateEngine, SqlateError,
        Template, Value,
    };

    #[test]
    #[ntest::timeout(1000)]
    fn test_value_serialization() {
        let value = Value::from(vec![Value::from(1), Value::from("a"), Value::Null]);
        let serialized = serde_json::to_string(&value).unwrap();
        assert_eq!(serialized, r#"[1,"a",null]"#);

        let deserialized: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, value);
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_context_from_json() {
        let context: Context =
            serde_json::from_str(r#"{"data":{"id":5,"name":"ann","tags":["x","y"],"gone":null}}"#)
                .unwrap();
        assert_eq!(context.get("id"), Some(&Value::Int(5)));
        assert_eq!(context.get("gone"), Some(&Value::Null));

        let out = SqlateEngine::new()
            .render("WHERE id = :id AND tag IN /*tags*/('') AND g = :gone", &context)
            .unwrap();
        assert_eq!(out.sql, "WHERE id = ? AND tag IN (?, ?) AND g = ?");
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_config_serialization() {
        let config: EngineConfig = serde_json::from_str(r#"{"placeholder":"Numbered"}"#).unwrap();
        assert_eq!(config.placeholder, PlaceholderStyle::Numbered);
        assert!(!config.coverage);
        assert!(!config.clause_cleanup);

        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_template_serialization() {
        let template =
            Template::named("by_id", "SELECT * FROM t /*BEGIN*/WHERE id = :id/*END*/").unwrap();

        let serialized = serde_json::to_string(&template).unwrap();
        let deserialized: Template = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, template);
        assert_eq!(deserialized.name(), Some("by_id"));

        let mut context = Context::new();
        context.insert("id", 3);
        let engine = SqlateEngine::new();
        assert_eq!(
            engine.transform(&template, &context).unwrap(),
            engine.transform(&deserialized, &context).unwrap()
        );
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_invalid_template_fails_to_deserialize() {
        let result: Result<Template, _> = serde_json::from_str(r#"{"source":"/*IF a*/"}"#);
        assert!(result.is_err());
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_result_and_error_serialization() {
        let mut context = Context::new();
        context.insert("a", "x");
        let out = SqlateEngine::new().render("a = :a", &context).unwrap();
        let serialized = serde_json::to_value(&out).unwrap();
        assert_eq!(serialized["sql"], "a = ?");
        let binds: Vec<BindParameter> =
            serde_json::from_value(serialized["binds"].clone()).unwrap();
        assert_eq!(binds, out.binds);

        let err = SqlateError::MissingParameter {
            name: "a".to_string(),
        };
        let serialized = serde_json::to_string(&err).unwrap();
        let deserialized: SqlateError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, err);
    }
}
