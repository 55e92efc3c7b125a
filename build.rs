//! Generates the gRPC server and client stubs for the two state store schema
//! versions. Messages are prost derives in `src/api/`, so there are no
//! `.proto` files and no protoc dependency.

fn store_service(package: &str, schema: &str) -> tonic_build::manual::Service {
    let shared = "crate::api::v1";
    let method = |name: &str, route: &str, input: String, output: String| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(input)
            .output_type(output)
            .codec_path("tonic::codec::ProstCodec")
            .build()
    };

    tonic_build::manual::Service::builder()
        .name("Store")
        .package(package)
        .method(method(
            "init",
            "Init",
            format!("{shared}::MetadataRequest"),
            format!("{shared}::Empty"),
        ))
        .method(method(
            "features",
            "Features",
            format!("{shared}::Empty"),
            format!("{shared}::FeaturesResponse"),
        ))
        .method(method(
            "delete",
            "Delete",
            format!("{schema}::DeleteRequest"),
            format!("{shared}::Empty"),
        ))
        .method(method(
            "get",
            "Get",
            format!("{schema}::GetRequest"),
            format!("{schema}::GetResponse"),
        ))
        .method(method(
            "set",
            "Set",
            format!("{schema}::SetRequest"),
            format!("{shared}::Empty"),
        ))
        .method(method(
            "ping",
            "Ping",
            format!("{shared}::Empty"),
            format!("{shared}::Empty"),
        ))
        .method(method(
            "bulk_delete",
            "BulkDelete",
            format!("{schema}::BulkDeleteRequest"),
            format!("{shared}::Empty"),
        ))
        .method(method(
            "bulk_get",
            "BulkGet",
            format!("{schema}::BulkGetRequest"),
            format!("{schema}::BulkGetResponse"),
        ))
        .method(method(
            "bulk_set",
            "BulkSet",
            format!("{schema}::BulkSetRequest"),
            format!("{shared}::Empty"),
        ))
        .build()
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let services = [
        store_service("state.v1", "crate::api::v1"),
        store_service("state.v1alpha1", "crate::api::v1alpha1"),
    ];

    tonic_build::manual::Builder::new().compile(&services);
}
