//! `crypto` / `crypto.subtle` endowments: a small object exposing
//! digest/random primitives backed by RustCrypto crates.
//!
//! `subtle.digest` deliberately returns the digest bytes synchronously
//! instead of a `Promise`: nothing downstream of this endowment needs a
//! real async bridge into a JS `Promise` from a bare host function.

use rand::RngCore;
use rquickjs::{Ctx, Exception, Object, Result, TypedArray, Value};
use sha2::{Digest, Sha256, Sha384, Sha512};

pub fn install(ctx: &Ctx<'_>) -> Result<()> {
    let crypto = Object::new(ctx.clone())?;
    crypto.set(
        "getRandomValues",
        rquickjs::Function::new(ctx.clone(), get_random_values),
    )?;

    let subtle = Object::new(ctx.clone())?;
    subtle.set("digest", rquickjs::Function::new(ctx.clone(), digest))?;
    crypto.set("subtle", subtle)?;

    ctx.globals().set("crypto", crypto)?;
    Ok(())
}

fn get_random_values<'js>(_ctx: Ctx<'js>, view: Object<'js>) -> Result<Object<'js>> {
    let len: usize = view.get("length")?;
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    for (i, b) in bytes.iter().enumerate() {
        view.set(i, *b)?;
    }
    Ok(view)
}

fn digest<'js>(ctx: Ctx<'js>, algorithm: String, data: Value<'js>) -> Result<TypedArray<'js, u8>> {
    let bytes = as_bytes(&ctx, data)?;
    let out = match algorithm.to_ascii_uppercase().as_str() {
        "SHA-256" | "SHA256" => Sha256::digest(&bytes).to_vec(),
        "SHA-384" | "SHA384" => Sha384::digest(&bytes).to_vec(),
        "SHA-512" | "SHA512" => Sha512::digest(&bytes).to_vec(),
        other => {
            return Err(Exception::throw_type(
                &ctx,
                &format!("Unsupported digest algorithm: {other}"),
            ));
        }
    };
    TypedArray::new(ctx, out)
}

fn as_bytes(ctx: &Ctx<'_>, value: Value<'_>) -> Result<Vec<u8>> {
    if let Some(s) = value.as_string() {
        return Ok(s.to_string()?.into_bytes());
    }
    if let Some(obj) = value.as_object()
        && let Some(array) = obj.as_typed_array::<u8>()
        && let Some(bytes) = array.as_bytes()
    {
        return Ok(bytes.to_vec());
    }
    Err(Exception::throw_type(
        ctx,
        "Expected a String or Uint8Array",
    ))
}
