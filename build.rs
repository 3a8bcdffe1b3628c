use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Create config template if it doesn't exist
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../dvbcore.conf.template");

    let template = concat!(
        "# dvbcore tuner configuration template\n",
        "# Copy this file to 'dvbcore.conf' and fill in your actual values\n",
        "\n",
        "Freq \"754000000\"\n",
        "Bandwidth \"8\"\n",
        "Module \"DVB_T2\"\n",
        "ProgramNumber \"0\"\n",
    );

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
