use switchyard_dal::DalError;
use switchyard_flags::FlagError;

#[test]
fn display_messages() {
    assert_eq!(
        DalError::Configuration("no token".into()).to_string(),
        "configuration error: no token"
    );
    assert_eq!(DalError::NotFound("policy row 7".into()).to_string(), "not found: policy row 7");
    assert_eq!(
        DalError::Permission("not the creator".into()).to_string(),
        "permission denied: not the creator"
    );
    assert_eq!(
        DalError::Capability {
            backend: "spreadsheet".into(),
            operation: "transaction".into(),
        }
        .to_string(),
        "transaction is not supported by the spreadsheet adapter"
    );
    assert_eq!(
        DalError::NoImplementationAvailable("policy:history".into()).to_string(),
        "no data access implementation available for \"policy:history\""
    );
}

#[test]
fn errors_are_cloneable() {
    let err = DalError::ExternalService("quota".into());
    let copy = err.clone();
    assert_eq!(err.to_string(), copy.to_string());
}

#[test]
fn json_errors_become_serialization_errors() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(DalError::from(parse), DalError::Serialization(_)));
}

#[test]
fn flag_errors_become_configuration_errors() {
    let err: DalError = FlagError::InvalidKey(String::new()).into();
    assert!(matches!(err, DalError::Configuration(_)));
}

#[test]
fn partial_write_reports_what_was_stored() {
    let err = DalError::PartialWrite {
        committed: 50,
        cause: Box::new(DalError::ExternalService("quota".into())),
    };
    assert_eq!(err.committed(), 50);
    assert_eq!(
        err.to_string(),
        "batch stopped after 50 stored records: external service error: quota"
    );
    assert_eq!(DalError::NotFound("x".into()).committed(), 0);
}
