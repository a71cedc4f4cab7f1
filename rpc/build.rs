// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile_protos(&["proto/rtd.proto"], &["proto"])?;
    Ok(())
}
