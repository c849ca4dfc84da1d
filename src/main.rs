// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use std::error::Error;
use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tee_verifier::api::encoding::{decode_base64, decode_hex, generate_nonce, pem_to_raw_hex};
use tee_verifier::config::{LoggingLevel, PolicyConfig};
use tee_verifier::store::{ExpectedMeasurements, MeasurementInput, MemoTrustAnchorStore};
use tee_verifier::verify::{VerificationRequest, VerifiedReport, Verifier};

#[derive(Parser)]
#[command(author, version)]
struct Cli {
    #[arg(short, long, value_enum, default_value_t = LoggingLevel::Warn, global = true)]
    log_level: LoggingLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    Verify(VerifyArgs),
    VerifySignature(VerifySignatureArgs),
    Nonce,
    PemToHex(PemToHexArgs),
}

#[derive(Debug, clap::Args)]
struct DocumentArgs {
    /// File holding the attestation document
    #[arg(short, long, default_value = "attestation.b64")]
    document: String,

    /// The document file holds raw CBOR rather than base64 text
    #[arg(long)]
    raw: bool,

    /// PEM file with the trusted root(s); defaults to the AWS Nitro Enclaves
    /// root
    #[arg(short, long)]
    root: Option<String>,

    /// Print the verified document as JSON
    #[arg(short, long)]
    json: bool,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Verify the supplied attestation document: certificate chain, \
    signature, nonce, freshness and measurement registers")]
struct VerifyArgs {
    #[command(flatten)]
    doc: DocumentArgs,

    /// Expected nonce, hex encoded
    #[arg(short, long)]
    nonce: String,

    /// Expected value of the default measurement register, hex encoded
    #[arg(long, conflicts_with = "pcrs", required_unless_present = "pcrs")]
    pcr: Option<String>,

    /// JSON file mapping register indices to expected hex values
    #[arg(long)]
    pcrs: Option<String>,

    /// Reference time, in seconds since the Unix epoch; defaults to now
    #[arg(short, long)]
    time: Option<u64>,

    /// JSON file with the policy configuration
    #[arg(short, long)]
    policy: Option<String>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Check the authenticity of the supplied attestation document: \
    certificate chain and signature only")]
struct VerifySignatureArgs {
    #[command(flatten)]
    doc: DocumentArgs,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Print the uncompressed EC point of a PEM public key as hex")]
struct PemToHexArgs {
    #[arg(short, long, default_value = "key.pem")]
    key: String,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.into())
        .init();

    match cli.command {
        Command::Verify(args) => match verify(&args) {
            Ok(r) => report("verification successful", &r, args.doc.json),
            Err(e) => eprintln!("verification failed: {e}"),
        },

        Command::VerifySignature(args) => match verify_signature(&args) {
            Ok(r) => report("verification successful", &r, args.doc.json),
            Err(e) => eprintln!("verification failed: {e}"),
        },

        Command::Nonce => match generate_nonce() {
            Ok(n) => println!("{n}"),
            Err(e) => eprintln!("nonce generation failed: {e}"),
        },

        Command::PemToHex(args) => match pem_to_hex(&args) {
            Ok(h) => println!("{h}"),
            Err(e) => eprintln!("conversion failed: {e}"),
        },
    }
}

fn report(msg: &str, r: &VerifiedReport, json: bool) {
    println!("{msg}");

    if json {
        match serde_json::to_string_pretty(r) {
            Ok(j) => println!("{j}"),
            Err(e) => eprintln!("serializing report: {e}"),
        }
    }
}

fn verifier(doc: &DocumentArgs, policy: PolicyConfig) -> Result<Verifier, Box<dyn Error>> {
    let anchors = match &doc.root {
        Some(path) => {
            let mut s = MemoTrustAnchorStore::new();
            s.load_pem(&fs::read_to_string(path)?)?;
            s
        }
        None => MemoTrustAnchorStore::nitro()?,
    };

    Ok(Verifier::new(anchors.into(), policy))
}

fn read_document(doc: &DocumentArgs) -> Result<Vec<u8>, Box<dyn Error>> {
    if doc.raw {
        return Ok(fs::read(&doc.document)?);
    }

    Ok(decode_base64(&fs::read_to_string(&doc.document)?)?)
}

fn verify(args: &VerifyArgs) -> Result<VerifiedReport, Box<dyn Error>> {
    let policy = match &args.policy {
        Some(path) => PolicyConfig::load_json(&fs::read_to_string(path)?)?,
        None => PolicyConfig::default(),
    };

    let measurements = match (&args.pcr, &args.pcrs) {
        (Some(hex), _) => ExpectedMeasurements::try_from(&MeasurementInput::from(hex.as_str()))?,
        (None, Some(path)) => ExpectedMeasurements::load_json(&fs::read_to_string(path)?)?,
        (None, None) => return Err("either --pcr or --pcrs is required".into()),
    };

    let reference = match args.time {
        Some(t) => Duration::from_secs(t),
        None => SystemTime::now().duration_since(UNIX_EPOCH)?,
    };

    let req = VerificationRequest::new(read_document(&args.doc)?)
        .with_nonce(decode_hex(&args.nonce)?)
        .with_measurements(measurements)
        .at(reference);

    Ok(verifier(&args.doc, policy)?.verify_attestation(&req)?)
}

fn verify_signature(args: &VerifySignatureArgs) -> Result<VerifiedReport, Box<dyn Error>> {
    let req = VerificationRequest::new(read_document(&args.doc)?);

    Ok(verifier(&args.doc, PolicyConfig::default())?.verify_signature_only(&req)?)
}

fn pem_to_hex(args: &PemToHexArgs) -> Result<String, Box<dyn Error>> {
    Ok(pem_to_raw_hex(&fs::read_to_string(&args.key)?)?)
}
