//! Repositories and tags over a flat image catalog
//!
//! The catalog knows only fully qualified names like `a/b:v1` or
//! `a/b@sha256:...`. Repositories and tags are recovered by parsing those
//! names; entries that do not parse belong to some other naming scheme and
//! are skipped rather than failing the whole listing.

use content_store::Store;
use futures::{StreamExt as _, TryStreamExt as _, stream};

use crate::backend::Iter;
use crate::blob::BlobStream;
use crate::error::{RegistryError, RegistryResult};
use crate::reference::{Reference, ReferenceError, validate_repository};

/// Every distinct repository named in the catalog, sorted.
///
/// The catalog is listed on first poll. A failed listing yields a single
/// error and nothing else.
pub fn repositories(store: Store) -> Iter<String> {
    stream::once(async move {
        let images = store.list(None).await?;
        let names = images.into_iter().map(|image| image.name);
        let repositories = distinct_repositories(names)
            .into_iter()
            .map(Ok::<_, RegistryError>);
        Ok::<_, RegistryError>(stream::iter(repositories))
    })
    .try_flatten()
    .boxed()
}

/// Sorted, deduplicated repository names of `names`.
///
/// Catalog order is by full name, which is not repository order: `a/b/c:v1`
/// sorts before `a/b:v1`, and `localhost:1` and `localhost:9` straddle
/// `localhost:5000/app:x`.
fn distinct_repositories<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut repositories: Vec<String> = names
        .into_iter()
        .filter_map(|name| match Reference::parse(&name) {
            Ok(reference) => Some(reference.repository().to_owned()),
            Err(error) => {
                tracing::debug!(%name, %error, "skipping catalog entry");
                None
            }
        })
        .collect();

    repositories.sort_unstable();
    repositories.dedup();
    repositories
}

/// Every tag in `repository`.
///
/// Digest references are not tags and are skipped. The catalog is queried
/// with the prefix `repository:`, and each result is still checked to belong
/// to `repository`.
pub fn tags(store: Store, repository: &str) -> Iter<String> {
    let repository = repository.to_owned();
    stream::once(async move {
        validate_repository(&repository)?;
        let prefix = format!("{repository}:");
        let images = store.list(Some(&prefix)).await?;
        let tags = images
            .into_iter()
            .filter_map(move |image| tag_of(&repository, &image.name));
        Ok::<_, RegistryError>(stream::iter(tags.map(Ok::<_, RegistryError>)))
    })
    .try_flatten()
    .boxed()
}

fn tag_of(repository: &str, name: &str) -> Option<String> {
    match Reference::parse(name) {
        Ok(Reference::Tagged {
            repository: found,
            tag,
        }) => {
            if found == repository {
                Some(tag)
            } else {
                tracing::warn!(%repository, %name, "catalog returned entry from another repository");
                None
            }
        }
        Ok(Reference::Digested { .. } | Reference::Repository(_)) => None,
        Err(error) => {
            tracing::debug!(%name, %error, "skipping catalog entry");
            None
        }
    }
}

/// Open the manifest `repository:tag` points at.
///
/// The catalog's target descriptor is used as-is; the store is not asked
/// whether the target exists until the stream is read.
#[tracing::instrument(skip(store))]
pub async fn get_tag(store: &Store, repository: &str, tag: &str) -> RegistryResult<BlobStream> {
    let name = format!("{repository}:{tag}");
    match Reference::parse(&name)? {
        Reference::Tagged {
            repository: found,
            tag: found_tag,
        } if found == repository && found_tag == tag => {}
        _ => return Err(ReferenceError::InvalidTag(tag.to_owned()).into()),
    }

    let image = store
        .get(&name)
        .await
        .map_err(|err| RegistryError::manifest(&name, err))?;

    Ok(BlobStream::unverified(store.clone(), image.target))
}
