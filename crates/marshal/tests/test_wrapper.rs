mod common;

use common::*;
use helios_marshal::{MarshalError, UnmarshalError, WrapperError, resolve_wrapper};

#[test]
fn test_resolution_is_stable() {
    let first = resolve_wrapper::<Money>().unwrap();
    for _ in 0..10 {
        assert_eq!(resolve_wrapper::<Money>().unwrap(), first);
    }
    assert!(first.type_name().ends_with("MoneyXml"));
}

#[test]
fn test_placeholder_capability_fails_the_same_way_every_time() {
    let first = resolve_wrapper::<Opaque>().unwrap_err();
    assert!(matches!(first, WrapperError::Ambiguous { .. }));
    for _ in 0..10 {
        assert_eq!(resolve_wrapper::<Opaque>().unwrap_err(), first);
    }
}

#[test]
fn test_missing_capability_is_not_inferable() {
    let err = resolve_wrapper::<Plain>().unwrap_err();
    assert!(matches!(err, WrapperError::NotInferable { domain } if domain.ends_with("Plain")));
}

#[test]
fn test_wrapped_operations_surface_resolver_errors() {
    let marshaller = marshaller();

    let err = marshaller
        .marshal_wrapped(&Opaque(1), Vec::new())
        .unwrap_err();
    assert!(matches!(
        err,
        MarshalError::Wrapper(WrapperError::Ambiguous { .. })
    ));

    let err = marshaller
        .unmarshal_wrapped::<Plain, _>("<plain/>".as_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        UnmarshalError::Wrapper(WrapperError::NotInferable { .. })
    ));
}

#[test]
fn test_wrapped_unmarshal_checks_wrapper_root() {
    let err = marshaller()
        .unmarshal_wrapped::<Money, _>("<price currency=\"EUR\">1.00</price>".as_bytes())
        .unwrap_err();
    assert!(matches!(err, UnmarshalError::UnexpectedRoot { .. }));
}
