use clap::Parser;
use std::io::Read;
use xsh::{Engine, Value};

#[derive(Parser)]
#[command(name = "xsh")]
#[command(about = "An embeddable pipeline/expression interpreter")]
#[command(version)]
struct Cli {
    /// Evaluate the expression from a command-line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Evaluate asynchronously (drives real futures to completion instead
    /// of the single-poll sync fast path)
    #[arg(long = "async")]
    asynchronous: bool,

    /// Parse as a template instead of a bare expression ("js" or "json")
    #[arg(long = "template", value_name = "TYPE")]
    template: Option<String>,

    /// Output the result as JSON
    #[arg(long = "json")]
    json: bool,

    /// Script or template file to evaluate
    #[arg()]
    file: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Determine source: -c, file, or stdin
    let source = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: cannot read file: {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("Error: no expression provided. Use -c 'expr', provide a file, or pipe via stdin.");
            std::process::exit(1);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    let engine = Engine::with_builtins();

    if let Some(ty) = cli.template {
        let result = if cli.asynchronous {
            engine.parse_template_async(&source, &ty, None).await
        } else {
            engine.parse_template(&source, &ty, None)
        };
        match result {
            Ok(text) => print!("{}", text),
            Err(e) => {
                report_error(&e, cli.json);
                std::process::exit(1);
            }
        }
        return;
    }

    let result = if cli.asynchronous {
        engine.parse_async(&source, None, None).await
    } else {
        engine.parse(&source, None, None)
    };

    match result {
        Ok(value) => print_value(&value, cli.json),
        Err(e) => {
            report_error(&e, cli.json);
            std::process::exit(1);
        }
    }
}

fn print_value(value: &Value, json: bool) {
    if json {
        println!("{}", serde_json::to_string(&value.to_json()).unwrap_or_else(|_| "null".to_string()));
    } else {
        println!("{}", value.to_display_string());
    }
}

fn report_error(err: &xsh::EngineErrorPayload, json: bool) {
    if json {
        eprintln!("{}", serde_json::to_string(err).unwrap_or_else(|_| "{}".to_string()));
    } else {
        eprintln!("Error [{}]: {}", err.kind, err.message);
    }
}
