use std::{fs::File, io::Write};

use structopt::StructOpt;
use thiserror::Error;

use lather_codegen as codegen;

#[derive(Debug, Error)]
enum Error {
    #[error("Error generating client")]
    GenerateError(#[from] codegen::Error),

    #[error("Generated code does not parse")]
    SyntaxError(#[from] syn::Error),

    #[error("Error writing output")]
    IoError(#[from] std::io::Error),
}

/// Generates a Rust client from a WSDL document.
#[derive(StructOpt)]
struct Args {
    #[structopt(short, long, default_value = "./output.rs")]
    output: String,

    /// Path or URL of the service description.
    input: String,
}

#[paw::main]
fn main(args: Args) -> Result<(), Error> {
    env_logger::init();

    let tokens = codegen::from_url(&args.input)?;
    let file = syn::parse2::<syn::File>(tokens)?;

    let mut output = File::create(&args.output)?;
    write!(&mut output, "{}", prettyplease::unparse(&file))?;

    log::info!("Wrote {}", args.output);
    Ok(())
}
