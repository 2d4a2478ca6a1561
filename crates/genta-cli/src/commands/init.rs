//! The `genta init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("genta.toml").exists() {
        println!("genta.toml already exists, skipping.");
    } else {
        std::fs::write("genta.toml", SAMPLE_CONFIG)?;
        println!("Created genta.toml");
    }

    std::fs::create_dir_all("fixtures")?;
    let example_path = Path::new("fixtures/example.toml");
    if example_path.exists() {
        println!("fixtures/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_FIXTURE)?;
        println!("Created fixtures/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set GENTA_OPENAI_KEY (or edit genta.toml) to enable feedback generation");
    println!("  2. Run: genta validate --fixture fixtures/example.toml");
    println!("  3. Run: genta simulate --fixture fixtures/example.toml --mock");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# genta configuration

# Language of generated feedback: "id" or "en".
feedback_language = "id"

[generation]
type = "openai"
api_key = "${OPENAI_API_KEY}"
model = "gpt-4o-mini"

# [generation]
# type = "anthropic"
# api_key = "${ANTHROPIC_API_KEY}"

[worker]
concurrency = 10
poll_interval_ms = 100
retry_base_delay_ms = 1000
retry_max_delay_ms = 60000
prune_interval_secs = 60

[worker.weights]
critical = 6
default = 3
low = 1
"#;

const EXAMPLE_FIXTURE: &str = r#"[practice]
name = "Contoh Latihan"
description = "A short mixed-section practice run"
target_theta = 0.5

[[questions]]
id = "pk-aljabar-1"
section = "PK"
sub_type = "aljabar"
difficulty = 0.3
text = "Jika 3x - 4 = 11, maka nilai x adalah..."
options = ["3", "4", "5", "6", "7"]
correct = "C"
explanation = "3x = 15 sehingga x = 5."

[[questions]]
id = "pk-aritmetika-1"
section = "PK"
sub_type = "aritmetika"
difficulty = -0.5
text = "Hasil dari 15% dari 200 adalah..."
options = ["15", "20", "30", "35", "40"]
correct = "C"
explanation = "0,15 x 200 = 30."

[[questions]]
id = "pu-deduktif-1"
section = "PU"
sub_type = "deduktif"
difficulty = 0.8
text = "Semua peserta UTBK wajib membawa kartu. Rina peserta UTBK. Kesimpulan yang tepat adalah..."
options = [
    "Rina tidak membawa kartu",
    "Rina wajib membawa kartu",
    "Sebagian peserta membawa kartu",
    "Rina bukan peserta",
    "Tidak dapat disimpulkan",
]
correct = "B"

[[questions]]
id = "lbe-main-idea-1"
section = "LBE"
sub_type = "main idea"
text = "The passage mainly discusses..."
options = [
    "the history of tea",
    "how tea is grown",
    "the health effects of tea",
    "tea markets in Asia",
    "tea ceremonies",
]
correct = "C"

[[answers]]
question = "pk-aljabar-1"
selected = "C"
time_spent_seconds = 75

[[answers]]
question = "pk-aritmetika-1"
selected = "D"
time_spent_seconds = 40

[[answers]]
question = "pu-deduktif-1"
selected = "B"
time_spent_seconds = 55

[[answers]]
question = "lbe-main-idea-1"
selected = "A"
time_spent_seconds = 90

[[answers]]
question = "pk-aritmetika-1"
selected = "C"
time_spent_seconds = 30
"#;
