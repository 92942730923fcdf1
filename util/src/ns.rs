pub const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const SOAP_ENC: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const WSDL_SOAP: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const WSDL_SOAP12: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";
pub const WSDL: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";

/// Prefixes declared on every outgoing envelope.
pub const ENVELOPE_PREFIXES: [(&str, &str); 7] = [
    ("soap-env", SOAP_ENV),
    ("soap-enc", SOAP_ENC),
    ("soap", WSDL_SOAP),
    ("soap12", WSDL_SOAP12),
    ("wsdl", WSDL),
    ("xsi", XSI),
    ("xsd", XSD),
];

/// Strips a `prefix:` or `{namespace}` qualifier from a name.
pub fn local(name: &str) -> &str {
    if let Some(index) = name.rfind('}') {
        return &name[index + 1..];
    }

    match name.split_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

/// The envelope prefix bound to `namespace`, if it is one of the well known ones.
pub fn envelope_prefix(namespace: &str) -> Option<&'static str> {
    ENVELOPE_PREFIXES
        .iter()
        .find(|(_, uri)| *uri == namespace)
        .map(|(prefix, _)| *prefix)
}
