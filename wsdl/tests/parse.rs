mod support;

use url::Url;

use lather_util::{
    message::Formatter,
    types::{Builtin, Kind, MaxOccurs, Registry, TypeId, TypeRef},
};
use lather_wsdl::{error::Error, Definition};

use support::fixture;

fn parse(name: &str) -> std::sync::Arc<Definition> {
    lather_wsdl::parse(fixture(name)).unwrap()
}

fn id(registry: &Registry, name: &str) -> TypeId {
    registry.find(name).unwrap().0
}

fn field_type(registry: &Registry, owner: &str, field: &str) -> TypeId {
    let (_, descriptor) = registry.find(owner).unwrap();
    let field = descriptor.complex().unwrap().field(field).unwrap();
    registry.resolve(&field.ty).unwrap()
}

fn parse_text(text: &'static str) -> Result<std::sync::Arc<Definition>, Error> {
    lather_wsdl::parse_with("http://example.com/service.wsdl", move |_: &Url| -> Result<String, Error> {
        Ok(text.to_owned())
    })
}

#[test]
fn lyrics_methods() {
    let definition = parse("lyrics.wsdl");
    assert_eq!(definition.target_namespace.as_deref(), Some("urn:LyricWiki"));

    let names: Vec<_> = definition.methods.iter().map(|method| method.name.as_str()).collect();
    assert_eq!(names, ["checkSongExists", "getSong", "getArtist"]);

    let check = definition.method("checkSongExists").unwrap();
    assert_eq!(check.location, "http://lyricwiki.org/server.php");
    assert_eq!(check.action, "urn:LyricWiki#checkSongExists");
    assert_eq!(check.input.formatter(), Formatter::RpcEncoded);
    assert_eq!(check.input.namespace.as_deref(), Some("urn:LyricWiki"));

    let parts: Vec<_> = check.input.parts.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(parts, ["artist", "song"]);
    assert!(check.input.parts.iter().all(|part| part.ty.id().is_some()));
}

#[test]
fn lyrics_types() {
    let definition = parse("lyrics.wsdl");
    let registry = &definition.registry;

    let (_, strings) = registry.find("ArrayOfstring").unwrap();
    assert_eq!(strings.kind, Kind::Array(TypeRef::Resolved(id(registry, "string"))));

    let (_, album) = registry.find("AlbumData").unwrap();
    let children: Vec<_> = album
        .complex()
        .unwrap()
        .children
        .iter()
        .map(|field| field.name.as_str())
        .collect();
    assert_eq!(children, ["album", "year", "amazonLink", "songs"]);
    assert_eq!(field_type(registry, "AlbumData", "year"), id(registry, "int"));
    assert_eq!(field_type(registry, "AlbumData", "songs"), id(registry, "ArrayOfstring"));
}

#[test]
fn accounts_bind_the_first_soap_port() {
    let definition = parse("accounts.wsdl");

    assert_eq!(definition.methods.len(), 2);
    for method in &definition.methods {
        assert_eq!(method.location, "http://accounts.example/api/service.asmx");
    }

    let authenticate = definition.method("Authenticate").unwrap();
    assert_eq!(authenticate.action, "http://accounts.example/api/Authenticate");
    assert_eq!(authenticate.input.formatter(), Formatter::DocumentLiteralWrapper);

    let headers: Vec<_> = authenticate.input.headers.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(headers, ["SessionHeader"]);
}

#[test]
fn accounts_types() {
    let definition = parse("accounts.wsdl");
    let registry = &definition.registry;

    let (_, access) = registry.find("ApiAccessMask").unwrap();
    assert_eq!(
        access.kind,
        Kind::Enum(vec!["None".into(), "Read".into(), "Write".into(), "Admin".into()])
    );

    let (_, account) = registry.find("Account").unwrap();
    let account = account.complex().unwrap();
    assert!(account.attribute("status").unwrap().required);
    assert_eq!(
        account.child("Name").unwrap().namespace.as_deref(),
        Some("http://accounts.example/api")
    );
    assert_eq!(field_type(registry, "Account", "Balance"), id(registry, "decimal"));

    let (_, authenticate) = registry.find("Authenticate").unwrap();
    assert_eq!(authenticate.tag.as_deref(), Some("Authenticate"));
    assert_eq!(authenticate.namespace.as_deref(), Some("http://accounts.example/api"));
}

#[test]
fn zoo_inheritance() {
    let definition = parse("zoo.wsdl");
    let registry = &definition.registry;

    let (animal_id, animal) = registry.find("Animal").unwrap();
    assert!(animal.complex().unwrap().is_abstract);

    let (dog_id, dog) = registry.find("Dog").unwrap();
    assert_eq!(dog.base, Some(animal_id));
    let complex = dog.complex().unwrap();
    assert_eq!(complex.type_attr.as_deref(), Some("Dog"));
    let children: Vec<_> = complex.children.iter().map(|field| field.name.as_str()).collect();
    assert_eq!(children, ["name", "breed"]);
    assert!(complex.attribute("id").is_some());
    assert!(registry.is_a(dog_id, animal_id));

    let head = field_type(registry, "Enclosure", "animal");
    let substitutions: Vec<_> = registry
        .descriptor(head)
        .unwrap()
        .complex()
        .unwrap()
        .substitutions
        .iter()
        .map(|(element, _)| element.as_str())
        .collect();
    assert_eq!(substitutions, ["dog", "cat"]);
}

#[test]
fn zoo_structure() {
    let definition = parse("zoo.wsdl");
    let registry = &definition.registry;

    let (_, enclosure) = registry.find("Enclosure").unwrap();
    let complex = enclosure.complex().unwrap();
    assert_eq!(complex.child("animal").unwrap().max, Some(MaxOccurs::Unbounded));
    assert_eq!(complex.child("feeding").unwrap().max, Some(MaxOccurs::Unbounded));
    assert_eq!(complex.child("cleaning").unwrap().max, Some(MaxOccurs::Unbounded));

    let tags = field_type(registry, "Enclosure", "tags");
    let tags = registry.descriptor(tags).unwrap();
    assert_eq!(tags.name.name, "Enclosure.tags");
    assert!(matches!(tags.kind, Kind::List(_)));

    assert_eq!(field_type(registry, "Enclosure", "next"), id(registry, "Enclosure"));
    assert_eq!(field_type(registry, "Enclosure", "keeper"), id(registry, "Keeper"));
    assert_eq!(field_type(registry, "Keeper", "enclosure"), id(registry, "Enclosure"));

    let (_, label) = registry.find("Label").unwrap();
    let label = label.complex().unwrap();
    assert_eq!(label.content_type, Some(TypeRef::Resolved(id(registry, "string"))));
    assert!(label.attribute("lang").is_some());

    let (_, note) = registry.find("Note").unwrap();
    assert!(note.complex().unwrap().any_attribute);

    let (_, weight) = registry.find("Weight").unwrap();
    assert_eq!(weight.kind, Kind::Simple(Builtin::Decimal));

    let contents = field_type(registry, "Crate", "contents");
    assert_eq!(registry.descriptor(contents).unwrap().kind, Kind::Any);
    assert_eq!(field_type(registry, "Crate", "size"), id(registry, "Crate.size"));
    assert_eq!(field_type(registry, "Crate", "remark"), id(registry, "string"));

    let (_, registered) = registry.find("registered").unwrap();
    assert_eq!(registered.kind, Kind::Simple(Builtin::Boolean));
    assert_eq!(registered.tag.as_deref(), Some("registered"));
}

#[test]
fn zoo_formatters() {
    let definition = parse("zoo.wsdl");
    assert_eq!(
        definition.method("Register").unwrap().input.formatter(),
        Formatter::DocumentLiteral
    );
    assert_eq!(
        definition.method("Inspect").unwrap().input.formatter(),
        Formatter::RpcLiteral
    );
}

#[test]
fn simple_types_carry_their_own_tag() {
    let definition = parse("codes.wsdl");
    let registry = &definition.registry;

    for name in ["Code", "Priority"] {
        let descriptor = registry.descriptor(id(registry, name)).unwrap();
        assert_eq!(descriptor.tag.as_deref(), Some(name));
        assert_eq!(descriptor.namespace.as_deref(), Some("urn:codes"));
    }

    let ping = &definition.methods[0];
    assert_eq!(ping.input.formatter(), Formatter::DocumentLiteral);
}

#[test]
fn circular_imports_resolve() {
    let definition = parse("tokens.wsdl");
    let registry = &definition.registry;

    let (_, token) = registry.find("ApplicationToken").unwrap();
    assert_eq!(token.name.namespace.as_deref(), Some("urn:tokens:a"));
    assert_eq!(field_type(registry, "ApplicationToken", "scope"), id(registry, "Scope"));
    assert_eq!(field_type(registry, "Scope", "delegate"), id(registry, "ApplicationToken"));
    assert_eq!(field_type(registry, "GetTokenResponse", "token"), id(registry, "ApplicationToken"));

    let method = definition.method("GetToken").unwrap();
    assert_eq!(method.action, "urn:tokens#GetToken");
    assert_eq!(method.input.formatter(), Formatter::DocumentLiteralWrapper);
}

#[test]
fn parsing_is_deterministic() {
    for name in ["lyrics.wsdl", "accounts.wsdl", "zoo.wsdl", "tokens.wsdl"] {
        assert_eq!(*parse(name), *parse(name), "{}", name);
    }
}

#[test]
fn unknown_types_are_reported() {
    let result = parse_text(
        r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
                        xmlns:xsd="http://www.w3.org/2001/XMLSchema"
                        xmlns:tns="urn:broken" targetNamespace="urn:broken">
             <types>
               <xsd:schema targetNamespace="urn:broken">
                 <xsd:complexType name="Holder">
                   <xsd:sequence>
                     <xsd:element name="value" type="tns:Missing"/>
                   </xsd:sequence>
                 </xsd:complexType>
               </xsd:schema>
             </types>
           </definitions>"#,
    );

    assert!(matches!(result, Err(Error::UnknownType(name)) if name == "tns:Missing"));
}

#[test]
fn soap_ports_need_a_soap_binding() {
    let result = parse_text(
        r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
                        xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
                        xmlns:tns="urn:broken" targetNamespace="urn:broken">
             <portType name="Ports"/>
             <binding name="Plain" type="tns:Ports"/>
             <service name="Broken">
               <port name="Port" binding="tns:Plain">
                 <soap:address location="http://example.com/soap"/>
               </port>
             </service>
           </definitions>"#,
    );

    assert!(matches!(result, Err(Error::NoSoapBinding(name)) if name == "Plain"));
}

#[test]
fn only_schemas_belong_in_types() {
    let result = parse_text(
        r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/" targetNamespace="urn:broken">
             <types><import namespace="urn:other"/></types>
           </definitions>"#,
    );

    assert!(matches!(result, Err(Error::UnknownConstruct(_))));
}
