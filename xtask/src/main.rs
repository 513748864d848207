/// Packages the plugin through nih_plug_xtask's `bundle` subcommand:
///
///   cargo xtask bundle simple-echo --release
///
/// The CLAP and VST3 bundles end up under `target/bundled/`.
fn main() -> nih_plug_xtask::Result<()> {
    nih_plug_xtask::main()
}
