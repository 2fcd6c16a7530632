use anyhow::Result;
use clap::Parser;
use color_print::ceprintln;
use forth65::Options;

#[derive(Debug, Parser)]
#[clap(version, about = "Forth cross-compiler targeting the 6502")]
struct Args {
    /// Source file
    input: String,

    /// Parameter stack base address, as an assembler literal
    #[clap(short = 'p', long = "pstack-bottom", default_value = "$600")]
    pstack_bottom: String,

    /// Parameter stack size in bytes, masked to 8 bits
    #[clap(short = 'S', long = "pstack-size", default_value_t = 256)]
    pstack_size: u32,

    /// Output section order
    #[clap(
        short = 's',
        long = "sections",
        default_value = "init,boot,data,text",
        value_delimiter = ','
    )]
    sections: Vec<String>,
}

fn run(args: Args) -> Result<String> {
    let options = Options {
        pstack_bottom: args.pstack_bottom,
        pstack_size: args.pstack_size,
        sections: args.sections,
    };
    let output = forth65::compile_file(&args.input, &options)?;
    Ok(output)
}

fn main() {
    let args = Args::parse();
    match run(args) {
        Ok(output) => print!("{}", output),
        Err(error) => {
            ceprintln!("<red,bold>error</>: {}", error);
            std::process::exit(1);
        }
    }
}
