use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use scriptlink::{
    Binding, CompileOptions, Context, ContextOptions, DataType, ExecuteOptions, Flags, Frame,
    Invocation, Signature, Value, render_error,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

const DEMO_SCRIPT: &str = "\
function TimesTwo(value: Integer): Integer;
begin
  Result := value * 2;
end;

var
  name: String;
begin
  debug(0.5, TimesTwo(21), 'test', True);
  name := GetInput('Please enter your name: ');
  PrintString('Hello, ' + name + '.');
end.";

/// scriptlink - Run scripts through a dynamically loaded engine
#[derive(Parser, Debug)]
#[command(name = "scriptlink")]
#[command(about = "Load a scripting engine, register demo callbacks and run a script", long_about = None)]
struct Args {
    /// Path to the engine library
    #[arg(long, env = "SCRIPTLINK_LIBRARY")]
    library: PathBuf,

    /// Script to run instead of the built-in demo
    #[arg(long)]
    script: Option<PathBuf>,

    /// Compile with the JIT enabled
    #[arg(long)]
    jit: bool,

    /// Enable OLE support in the context
    #[arg(long)]
    ole: bool,

    /// Enable inline assembler support
    #[arg(long)]
    asm: bool,

    /// Script function to call without state after execution
    #[arg(long, value_name = "NAME")]
    call: Option<String>,

    /// Argument for --call; integers, floats and true/false are typed, anything else is a string
    #[arg(long = "arg", value_name = "VALUE", requires = "call")]
    args: Vec<String>,
}

impl Args {
    fn flags(&self) -> Flags {
        let mut flags = Flags::empty();
        flags.set(Flags::JITTER, self.jit);
        flags.set(Flags::OLE, self.ole);
        flags.set(Flags::ASM, self.asm);
        flags
    }
}

/// Type a command-line argument the way a script literal would be typed.
fn parse_arg(text: &str) -> Value {
    if let Ok(i) = text.parse::<i32>() {
        Value::Integer(i)
    } else if let Ok(f) = text.parse::<f32>() {
        Value::Float(f)
    } else if text.eq_ignore_ascii_case("true") {
        Value::Boolean(true)
    } else if text.eq_ignore_ascii_case("false") {
        Value::Boolean(false)
    } else {
        Value::String(text.to_string())
    }
}

/// Enumerate the incoming parameters, then call back into the script.
fn debug(call: &mut Invocation<'_>) {
    println!(
        "Function [{}] called, parameter count: {}",
        call.function_name(),
        call.parameters().len()
    );
    for (index, parameter) in call.parameters().iter().enumerate() {
        println!(
            "{} [{}]: ({}) {}",
            index,
            parameter.name,
            parameter.value.datatype(),
            parameter.value
        );
    }

    let mut frame = Frame::new();
    frame.arg(2659004).ok();
    match call.call("TimesTwo", &mut frame) {
        Ok(()) => match frame.result.as_integer() {
            Ok(result) => println!("TimesTwo(2659004) returned value: {}", result),
            Err(e) => println!("Incorrect return type from TimesTwo(): {}", e),
        },
        Err(e) => println!("Could not call function: {}", e),
    }
}

fn print_string(call: &mut Invocation<'_>) {
    if let Some(message) = call.parameter(0) {
        println!("{}", message);
    }
}

fn get_input(call: &mut Invocation<'_>) {
    if let Some(prompt) = call.parameter(0) {
        print!("{}", prompt);
        std::io::stdout().flush().ok();
    }

    let mut line = String::new();
    if let Err(e) = std::io::stdin().read_line(&mut line) {
        warn!(error = %e, "failed to read from stdin");
    }
    let line = line.trim_end_matches(['\r', '\n']);
    call.set_result(line);
}

fn register_demo_functions(context: &mut Context<'_>) -> Result<(), scriptlink::Error> {
    context.define(
        "debug",
        Signature::new()
            .param("a", DataType::Float)
            .param("bb", DataType::Integer)
            .param("ccc", DataType::String)
            .param("dddd", DataType::Boolean),
        debug,
    )?;
    context.define(
        "PrintString",
        Signature::new().param("message", DataType::String),
        print_string,
    )?;
    context.define(
        "GetInput",
        Signature::new()
            .param("message", DataType::String)
            .returns(DataType::String),
        get_input,
    )?;
    Ok(())
}

fn run(binding: &Binding, args: &Args, source: &str) -> Result<()> {
    let flags = args.flags();
    let report = |e: scriptlink::Error| {
        render_error(&e, Some(source));
        miette!("{:?}", e.kind())
    };

    let mut context = binding
        .create_context(ContextOptions {
            flags: flags & Flags::OLE,
        })
        .map_err(report)?;
    register_demo_functions(&mut context).map_err(report)?;

    context
        .compile(source, CompileOptions {
            flags: flags & Flags::JITTER,
        })
        .map_err(report)?;
    context
        .execute(ExecuteOptions {
            flags: flags & Flags::ASM,
        })
        .map_err(report)?;

    if let Some(name) = &args.call {
        let mut frame = Frame::with_args(args.args.iter().map(|a| parse_arg(a))).into_diagnostic()?;
        context.call_stateless(name, &mut frame).map_err(report)?;
        println!("{} returned: {}", name, frame.result);
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging subscriber
    use tracing_subscriber::{EnvFilter, fmt};

    // Use RUST_LOG to control log level, default to WARN if not set
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .into_diagnostic()?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let source = match &args.script {
        Some(path) => std::fs::read_to_string(path).into_diagnostic()?,
        None => DEMO_SCRIPT.to_string(),
    };

    let binding = Binding::load(&args.library).map_err(|e| {
        render_error(&e, None);
        miette!("could not load the engine")
    })?;

    let result = run(&binding, &args, &source);
    binding.unload();
    result?;

    println!("\nDone.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("21"), Value::Integer(21));
        assert_eq!(parse_arg("0.5"), Value::Float(0.5));
        assert_eq!(parse_arg("TRUE"), Value::Boolean(true));
        assert_eq!(parse_arg("false"), Value::Boolean(false));
        assert_eq!(parse_arg("hello"), Value::String("hello".to_string()));
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["scriptlink", "--library", "x.so", "--jit", "--asm"]);
        assert_eq!(args.flags(), Flags::JITTER | Flags::ASM);
    }

    #[test]
    fn test_args_require_call() {
        assert!(Args::try_parse_from(["scriptlink", "--library", "x.so", "--arg", "1"]).is_err());
        let args = Args::try_parse_from([
            "scriptlink", "--library", "x.so", "--call", "Double", "--arg", "21",
        ])
        .unwrap();
        assert_eq!(args.call.as_deref(), Some("Double"));
        assert_eq!(args.args, vec!["21".to_string()]);
    }
}
