fn main() -> std::process::ExitCode {
    expression_pack_lib::run()
}
