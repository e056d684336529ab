use luabridge::{BridgeOption, LuaError, LuaInstance, Value};
use std::env;
use std::io::{self, Read};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const VERSION: &str = "luabridge 0.1.0 (Lua 5.4 host-object bridge)";
const PROGNAME: &str = "bridge";

fn print_usage() {
    eprintln!("usage: {} [options] [script [args]]", PROGNAME);
    eprintln!("Available options are:");
    eprintln!("  -e stat   execute string 'stat'");
    eprintln!("  -t        attach a traceback to runtime errors");
    eprintln!("  -n        do not open the standard libraries");
    #[cfg(feature = "serde")]
    eprintln!("  -j        print results as JSON");
    eprintln!("  -v        show version information");
    eprintln!("  --        stop handling options");
    eprintln!("  -         stop handling options and execute stdin");
}

#[derive(Debug, Default, PartialEq)]
struct Options {
    execute_strings: Vec<String>,
    script_file: Option<String>,
    script_args: Vec<String>,
    traceback: bool,
    no_stdlib: bool,
    json: bool,
    show_version: bool,
    read_stdin: bool,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut i = 1;
    let mut stop_options = false;

    while i < args.len() {
        let arg = &args[i];

        if !stop_options && arg.starts_with('-') {
            match arg.as_str() {
                "-e" => {
                    i += 1;
                    if i >= args.len() {
                        return Err("'-e' needs argument".to_string());
                    }
                    opts.execute_strings.push(args[i].clone());
                }
                "-t" => opts.traceback = true,
                "-n" => opts.no_stdlib = true,
                "-j" if cfg!(feature = "serde") => opts.json = true,
                "-v" => opts.show_version = true,
                "--" => stop_options = true,
                "-" => {
                    opts.read_stdin = true;
                    stop_options = true;
                }
                _ => return Err(format!("unrecognized option '{}'", arg)),
            }
        } else {
            // First non-option argument is the script, the rest belong to it
            opts.script_file = Some(arg.clone());
            opts.script_args = args[i + 1..].to_vec();
            break;
        }
        i += 1;
    }

    Ok(opts)
}

/// `arg[0]` = script, `arg[-1]` = interpreter, `arg[1..]` = script arguments.
fn setup_arg_table(
    lua: &LuaInstance,
    exe_path: &str,
    script: Option<&str>,
    args: &[String],
) -> Result<(), LuaError> {
    let state = lua.state()?;
    if !state.check_stack(2) {
        return Err(LuaError::Memory("stack overflow".to_string()));
    }
    state.create_table(args.len() as i32, 2);
    if let Some(name) = script {
        state.push_string(name);
        state.raw_seti(-2, 0);
    }
    state.push_string(exe_path);
    state.raw_seti(-2, -1);
    for (i, a) in args.iter().enumerate() {
        state.push_string(a);
        state.raw_seti(-2, (i + 1) as i64);
    }
    state.set_global("arg");
    Ok(())
}

fn format_results(
    lua: &LuaInstance,
    values: &[Value],
    #[cfg_attr(not(feature = "serde"), allow(unused_variables))] json: bool,
) -> Result<String, LuaError> {
    #[cfg(feature = "serde")]
    if json {
        return luabridge::serde::values_to_json_string(values, false).map_err(LuaError::Runtime);
    }

    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Other(kind) => kind.clone(),
            // Without the standard libraries there is no tostring to call
            other => match lua.call_global("tostring", std::slice::from_ref(other)) {
                Ok(results) => match results.first() {
                    Some(Value::String(s)) => s.clone(),
                    _ => format!("{:?}", other),
                },
                Err(_) => format!("{:?}", other),
            },
        };
        parts.push(text);
    }
    Ok(parts.join("\t"))
}

fn report(values: Vec<Value>, lua: &LuaInstance, json: bool) -> Result<(), LuaError> {
    if !values.is_empty() {
        println!("{}", format_results(lua, &values, json)?);
    }
    Ok(())
}

fn bridge_main() -> i32 {
    let args: Vec<String> = env::args().collect();
    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}: {}", PROGNAME, e);
            print_usage();
            return 1;
        }
    };

    if opts.show_version {
        println!("{}", VERSION);
        if opts.execute_strings.is_empty() && opts.script_file.is_none() && !opts.read_stdin {
            return 0;
        }
    }

    let option = BridgeOption {
        open_libs: !opts.no_stdlib,
        traceback: opts.traceback,
        ..BridgeOption::default()
    };

    let run = || -> Result<(), LuaError> {
        let lua = LuaInstance::with_option(option)?;
        lua.open_bridge_libs()?;
        let exe = args.first().map(String::as_str).unwrap_or(PROGNAME);
        setup_arg_table(&lua, exe, opts.script_file.as_deref(), &opts.script_args)?;

        for code in &opts.execute_strings {
            let values = lua.exec_named(code, "=(command line)")?;
            report(values, &lua, opts.json)?;
        }

        if let Some(script) = &opts.script_file {
            let values = lua.exec_file(script)?;
            report(values, &lua, opts.json)?;
        } else if opts.read_stdin {
            let mut code = String::new();
            io::stdin()
                .read_to_string(&mut code)
                .map_err(|e| LuaError::File(format!("error reading stdin: {}", e)))?;
            let values = lua.exec_named(&code, "=stdin")?;
            report(values, &lua, opts.json)?;
        } else if opts.execute_strings.is_empty() {
            print_usage();
        }
        Ok(())
    };

    match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}: [{}] {}", PROGNAME, e.status(), e);
            1
        }
    }
}

fn main() {
    std::process::exit(bridge_main());
}
