// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::BufWriter;

fn main() -> Result<()> {
    idol::Generator::new()
        .build_server_support(
            "../../idl/net.idol",
            "server_stub.rs",
            idol::server::ServerStyle::InOrder,
        )
        .map_err(|e| anyhow!(e))?;

    let config = build_net_stack::load_net_stack_config()?;
    let out_dir = build_util::out_dir();
    let dest = File::create(out_dir.join("net_config.rs"))?;
    build_net_stack::generate_client_config(&config, BufWriter::new(dest))?;

    Ok(())
}
