//! Remote cache commands: `store-cache`, `list-cache`, `delete-cache` and
//! `process-conan-cache`

use anyhow::Result;

use conan_utils::conan::Conan;
use conan_utils::ops::{
    delete_cache, list_cache, process_conan_cache, store_cache, StoreOptions, UploadOptions,
};
use conan_utils::GlobalContext;

use crate::cli::{DeleteCacheArgs, ListCacheArgs, ProcessConanCacheArgs, StoreCacheArgs};

pub fn store(ctx: &GlobalContext, args: StoreCacheArgs) -> Result<()> {
    let client = args.remote.cache_remote().client(ctx.config())?;
    let compression = match args.compression {
        Some(compression) => compression,
        None => ctx.config().compression()?,
    };
    let opts = StoreOptions {
        group_id: args.group_id,
        cache_id: args.cache_id,
        compression,
        metadata_file: args.metadata_file,
    };

    for uri in store_cache(ctx, &client, &opts)? {
        println!("{}", uri);
    }
    Ok(())
}

pub fn list(ctx: &GlobalContext, args: ListCacheArgs) -> Result<()> {
    let client = args.remote.cache_remote().client(ctx.config())?;
    for path in list_cache(&client, &args.group_id)? {
        println!("{}", path);
    }
    Ok(())
}

pub fn delete(ctx: &GlobalContext, args: DeleteCacheArgs) -> Result<()> {
    let client = args.remote.cache_remote().client(ctx.config())?;
    let compression = match args.compression {
        Some(compression) => compression,
        None => ctx.config().compression()?,
    };

    let count = delete_cache(&client, &args.group_id, args.cache_id.as_deref(), compression)?;
    tracing::debug!("deleted {} paths", count);
    Ok(())
}

pub fn process(ctx: &GlobalContext, conan: &Conan, args: ProcessConanCacheArgs) -> Result<()> {
    let client = args.remote.cache_remote().client(ctx.config())?;
    let upload = UploadOptions {
        recipes_remote: args.recipes_remote,
        binaries_remote: args.binaries_remote,
        upload_build_tools: false,
    };

    process_conan_cache(ctx, conan, &client, &args.group_id, &upload)
}
