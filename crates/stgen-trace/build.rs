fn main() {
    println!("cargo:rerun-if-changed=schema");
    capnpc::CompilerCommand::new()
        .src_prefix("schema")
        .file("schema/STEventTraceUncompressed.capnp")
        .file("schema/STEventTraceCompressed.capnp")
        .run()
        .expect("compiling trace schemas");
}
